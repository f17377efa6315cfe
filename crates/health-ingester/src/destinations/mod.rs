// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod local_file;
pub mod stdout;

pub use local_file::{LocalFile, LOCAL_FILE_NAME};
pub use stdout::{Stdout, STDOUT_NAME};
