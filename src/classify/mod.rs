//! Error classification.
//!
//! Collaborators report failures as free text. The classifier maps that text
//! onto a closed set of categories by case-insensitive substring matching
//! against ordered pattern groups. Groups share vocabulary ("403" shows up in
//! both API and permission failures), so the table order is part of the
//! contract: the first group with a matching pattern wins.
//!
//! HTTP status codes are matched as whole numbers next to a status word
//! (`status 500`, `error: 403`, `HTTP/1.1 502`) or a reason phrase
//! (`404 Not Found`). Bare digit runs such as ports, timings or object ids
//! never count.
//!
//! | Order | Category             | Typical source                          |
//! |-------|----------------------|-----------------------------------------|
//! | 1     | `transfer_operation` | `git clone` / `git push` failures       |
//! | 2     | `api_operation`      | non-success responses from the host API |
//! | 3     | `network`            | timeouts, DNS, refused connections      |
//! | 4     | `filesystem`         | missing files, lock contention          |
//! | 5     | `permission`         | credentials and access control          |
//! | 6     | `validation`         | bad input, pre-existing destinations    |

pub mod downgrade;

pub use downgrade::is_downgradable;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Category of a failed operation, used for reporting and retry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TransferOperation,
    ApiOperation,
    Network,
    Permission,
    Validation,
    Filesystem,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::TransferOperation,
        ErrorCategory::ApiOperation,
        ErrorCategory::Network,
        ErrorCategory::Permission,
        ErrorCategory::Validation,
        ErrorCategory::Filesystem,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::TransferOperation => "transfer_operation",
            ErrorCategory::ApiOperation => "api_operation",
            ErrorCategory::Network => "network",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Filesystem => "filesystem",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid error category '{}'. Valid values: transfer_operation, api_operation, network, permission, validation, filesystem, unknown",
                    s
                )
            })
    }
}

/// A pattern group: every pattern is lowercase and matched as a substring.
struct PatternGroup {
    category: ErrorCategory,
    patterns: &'static [&'static str],
    status_codes: &'static [u16],
}

/// HTTP status in context, captured in group 1 or 2. Applied to lowercase text.
static HTTP_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\b(?:http|status|code|error|returned)\W{0,3}|\bhttp/\d(?:\.\d)?\s+)(\d{3})\b|\b(\d{3})\s+(?:forbidden|not found|unprocessable|internal server error|bad gateway|service unavailable|unauthorized)",
    )
    .expect("http status pattern is a valid regex")
});

fn http_statuses(message: &str) -> Vec<u16> {
    HTTP_STATUS
        .captures_iter(message)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Ordered classification table. Earlier groups take precedence.
const PATTERN_GROUPS: &[PatternGroup] = &[
    PatternGroup {
        category: ErrorCategory::TransferOperation,
        patterns: &[
            "git push",
            "git clone",
            "git fetch",
            "push",
            "clone",
            "remote rejected",
            "non-fast-forward",
            "pack-objects",
            "index-pack",
            "unpack",
        ],
        status_codes: &[],
    },
    PatternGroup {
        category: ErrorCategory::ApiOperation,
        patterns: &[
            "api error",
            "api request",
            "api returned",
            "rate limit",
            "status code",
            "unprocessable entity",
        ],
        status_codes: &[403, 404, 422, 500, 502, 503],
    },
    PatternGroup {
        category: ErrorCategory::Network,
        patterns: &[
            "timeout",
            "timed out",
            "connection refused",
            "connection reset",
            "connection closed",
            "could not resolve host",
            "dns error",
            "network",
            "econnreset",
            "etimedout",
            "temporarily unavailable",
            "tls handshake",
            "failed to connect",
            "couldn't connect",
        ],
        status_codes: &[],
    },
    PatternGroup {
        category: ErrorCategory::Filesystem,
        patterns: &[
            "no such file or directory",
            "enoent",
            "ebusy",
            "resource busy",
            "no space left",
            "directory not empty",
            "file exists",
            ".lock'",
            "read-only file system",
        ],
        status_codes: &[],
    },
    PatternGroup {
        category: ErrorCategory::Permission,
        patterns: &[
            "permission denied",
            "access denied",
            "forbidden",
            "unauthorized",
            "authentication failed",
            "eacces",
        ],
        status_codes: &[401],
    },
    PatternGroup {
        category: ErrorCategory::Validation,
        patterns: &[
            "validation",
            "invalid",
            "already exists",
            "not empty",
            "must be",
            "is required",
        ],
        status_codes: &[],
    },
];

/// Map a raw failure description to its [`ErrorCategory`].
///
/// Deterministic and side-effect free. Text matching none of the groups is
/// [`ErrorCategory::Unknown`].
pub fn classify(raw_message: &str) -> ErrorCategory {
    let message = raw_message.to_lowercase();
    let statuses = http_statuses(&message);
    PATTERN_GROUPS
        .iter()
        .find(|group| {
            group.patterns.iter().any(|p| message.contains(p))
                || group.status_codes.iter().any(|c| statuses.contains(c))
        })
        .map(|group| group.category)
        .unwrap_or(ErrorCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_group() {
        assert_eq!(
            classify("git clone --mirror exited with status 128"),
            ErrorCategory::TransferOperation
        );
        assert_eq!(
            classify("GitHub API error: 422 Unprocessable Entity"),
            ErrorCategory::ApiOperation
        );
        assert_eq!(
            classify("error sending request: connection refused"),
            ErrorCategory::Network
        );
        assert_eq!(
            classify("ENOENT: No such file or directory, rmdir 'work/a.git'"),
            ErrorCategory::Filesystem
        );
        assert_eq!(
            classify("Permission denied (publickey)"),
            ErrorCategory::Permission
        );
        assert_eq!(
            classify("Repository name is invalid"),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("something odd happened"), ErrorCategory::Unknown);
        assert_eq!(classify(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("CONNECTION REFUSED"), ErrorCategory::Network);
        assert_eq!(classify("Git Push Failed"), ErrorCategory::TransferOperation);
    }

    #[test]
    fn test_status_codes_need_http_context() {
        assert_eq!(
            classify("fatal: unable to access 'https://git.example.com/svc.git/': Failed to connect to git.example.com port 443 after 5003 ms: Couldn't connect to server"),
            ErrorCategory::Network
        );
        assert_eq!(
            classify("object 4041a9c not found after 500 attempts"),
            ErrorCategory::Unknown
        );
        assert_eq!(classify("HTTP status server error (502 Bad Gateway)"), ErrorCategory::ApiOperation);
        assert_eq!(classify("HTTP/1.1 503"), ErrorCategory::ApiOperation);
        assert_eq!(
            classify("The requested URL returned error: 404"),
            ErrorCategory::ApiOperation
        );
        assert_eq!(classify("server answered 401 Unauthorized"), ErrorCategory::Permission);
    }

    #[test]
    fn test_transfer_checked_before_network() {
        assert_eq!(
            classify("push timed out after 300s"),
            ErrorCategory::TransferOperation
        );
    }

    #[test]
    fn test_api_checked_before_permission() {
        // 403 is shared vocabulary; the API group must win.
        assert_eq!(
            classify("403 Forbidden: permission denied"),
            ErrorCategory::ApiOperation
        );
        assert_eq!(classify("forbidden"), ErrorCategory::Permission);
    }

    #[test]
    fn test_filesystem_checked_before_permission() {
        assert_eq!(
            classify("unable to create 'HEAD.lock': File exists, permission denied"),
            ErrorCategory::Filesystem
        );
    }

    #[test]
    fn test_network_checked_before_validation() {
        assert_eq!(
            classify("invalid response: operation timed out"),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_category_display_and_parse() {
        for category in ErrorCategory::ALL {
            let parsed: ErrorCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert_eq!(
            "api-operation".parse::<ErrorCategory>().unwrap(),
            ErrorCategory::ApiOperation
        );
        assert!("bogus".parse::<ErrorCategory>().is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::TransferOperation).unwrap();
        assert_eq!(json, "\"transfer_operation\"");
    }
}
