// Copyright 2025 fanrpc Authors
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

//! # fanrpc CLI
//!
//! Command-line front end for the fanrpc client.
//!
//! ## Key Commands
//!
//! - `fanrpc call`: call one server picked by discovery (outputs raw JSON)
//! - `fanrpc broadcast`: call every server and print one successful reply
//! - `fanrpc serve`: run the demo TCP server used to try the other two

pub mod demo;
