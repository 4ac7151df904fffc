// Copyright 2025 Cardrender Authors
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

//! # Cardrender CLI
//!
//! Command-line interface for the cardrender render pipeline.
//!
//! This crate provides the main entry point for running cardrender components:
//!
//! - **Server**: Listens on the Unix socket and dispatches routes to workers
//! - **Worker**: Pool child process answering jobs over stdin/stdout
//! - **Call**: One-shot client writing the rendered bytes to a file or stdout
//!
//! ## Architecture
//!
//! The CLI uses the `argh` crate for argument parsing and dispatches to the
//! component implementations in `cardrender-server` and `cardrender-client`.

pub mod logging;
