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

//! Tracing setup for each subcommand.

use tracing_subscriber::EnvFilter;

/// Where and when a subcommand logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Logs to stdout at `info` unless `RUST_LOG` says otherwise.
    Server,
    /// Logs to stderr at `info`; stdout carries the job channel.
    Worker,
    /// Logs to stderr only when `RUST_LOG` is set, so output stays pipeable.
    Quiet,
}

/// Builds the filter for `mode`, or `None` when nothing should be logged.
pub fn filter(mode: LogMode, rust_log: Option<&str>) -> Option<EnvFilter> {
    match rust_log {
        Some(directives) if !directives.is_empty() => Some(EnvFilter::new(directives)),
        _ if mode == LogMode::Quiet => None,
        _ => Some(EnvFilter::new("info")),
    }
}

/// Installs the global subscriber for `mode`.
pub fn init(mode: LogMode) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let Some(env_filter) = filter(mode, rust_log.as_deref()) else {
        return;
    };

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    match mode {
        LogMode::Server => builder.init(),
        LogMode::Worker | LogMode::Quiet => builder.with_writer(std::io::stderr).with_ansi(false).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_without_rust_log() {
        assert!(filter(LogMode::Quiet, None).is_none());
        assert!(filter(LogMode::Quiet, Some("")).is_none());
        assert!(filter(LogMode::Quiet, Some("debug")).is_some());
    }

    #[test]
    fn test_server_and_worker_default_to_info() {
        assert_eq!(filter(LogMode::Server, None).unwrap().to_string(), "info");
        assert_eq!(filter(LogMode::Worker, None).unwrap().to_string(), "info");
        assert_eq!(
            filter(LogMode::Worker, Some("cardrender_server=debug")).unwrap().to_string(),
            "cardrender_server=debug"
        );
    }
}
