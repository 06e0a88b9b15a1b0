// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::large_enum_variant)]

pub mod base_types;
pub mod crypto;
pub mod environment;

pub use base_types::*;
pub use environment::Environment;
