// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Mapping
//!
//! The process exit contract:
//!
//! | code | meaning |
//! |------|---------------------------------------------|
//! | 0    | every selected volume captured and shipped  |
//! | 1    | one or more volumes failed                  |
//! | 2    | orchestrator-level error (config, spool)    |
//! | 3    | invalid invocation                          |

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    VolumeFailures = 1,
    Fatal = 2,
    Usage = 3,
}

impl ExitCode {
    /// Map a run's failed-volume count onto an exit code.
    pub fn from_failed_volumes(failed: u64) -> Self {
        if failed == 0 {
            ExitCode::Success
        } else {
            ExitCode::VolumeFailures
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_contract() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::VolumeFailures.code(), 1);
        assert_eq!(ExitCode::Fatal.code(), 2);
        assert_eq!(ExitCode::Usage.code(), 3);
    }

    #[test]
    fn test_from_failed_volumes() {
        assert_eq!(ExitCode::from_failed_volumes(0), ExitCode::Success);
        assert_eq!(ExitCode::from_failed_volumes(3), ExitCode::VolumeFailures);
    }
}
