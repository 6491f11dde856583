// Copyright 2025 odoolink Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # odoolink CLI
//!
//! Command-line front end for the odoolink client stack.
//!
//! ## Architecture
//!
//! Arguments are parsed with `argh` ([`args`]); each subcommand builds a
//! [`ConnectionManager`](odoolink_client::ConnectionManager) from a JSON
//! config file and runs through [`commands`].
//!
//! ## Key Commands
//!
//! - `odoolink call`: one model method call, raw JSON result on stdout
//! - `odoolink ping`: server version and user id for each instance

pub mod args;
pub mod commands;

#[cfg(test)]
mod tests;
