// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod deploy;
pub mod run;

pub use deploy::{DeployArgs, deploy_command};
pub use run::{RunArgs, run_command};
