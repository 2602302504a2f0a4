//! Endpoint Resolver (spec.md §4.2).
//!
//! Maps logical endpoint names to ordered fallback chains of concrete
//! `httpapi.asp?command=...` paths, parameterized by profile. An empty
//! chain means the operation is unsupported on this profile and callers
//! should raise [`crate::error::Error::UnsupportedOperation`] without
//! attempting I/O — fallback is re-evaluated per call, never pinned.

use crate::profile::DeviceProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalEndpoint {
    PlayerStatus,
    Metadata,
    GroupInfoSelf,
    GroupInfoSlaveList,
    PlayerCmd,
    Multiroom,
    Eq,
    Alarm,
}

/// Build the ordered fallback chain of concrete `command=` values for a
/// logical endpoint under a given profile. Returned in priority order;
/// the caller tries each in turn until one returns a parseable response.
pub fn endpoint_chain(endpoint: LogicalEndpoint, profile: &DeviceProfile) -> Vec<&'static str> {
    match endpoint {
        LogicalEndpoint::PlayerStatus => {
            if profile.vendor == "Audio Pro" && profile.generation == 3 {
                // MkII: the *Ex endpoint is unsupported, getStatusEx is primary.
                vec!["getStatusEx", "getPlayerStatus", "getStatus"]
            } else {
                vec![
                    "getPlayerStatusEx",
                    "getStatusEx",
                    "getPlayerStatus",
                    "getStatus",
                ]
            }
        }
        LogicalEndpoint::Metadata => {
            if profile.endpoints.metadata {
                vec!["getMetaInfo"]
            } else {
                vec![]
            }
        }
        LogicalEndpoint::GroupInfoSelf => vec!["getStatusEx"],
        LogicalEndpoint::GroupInfoSlaveList => vec!["multiroom:getSlaveList"],
        LogicalEndpoint::PlayerCmd => vec!["setPlayerCmd"],
        LogicalEndpoint::Multiroom => vec!["setMultiroom", "multiroom"],
        LogicalEndpoint::Eq => {
            if profile.endpoints.eq {
                vec!["EQLoad", "EQGetStat", "EQGetBand", "EQSetBand"]
            } else {
                vec![]
            }
        }
        LogicalEndpoint::Alarm => {
            if profile.endpoints.alarm {
                vec!["setAlarmClock", "setShutdown"]
            } else {
                vec![]
            }
        }
    }
}

/// Commands allowed to return non-JSON (plain `OK`, empty body) and still
/// be treated as success (spec.md §4.2). Expressed as a table keyed by
/// command *prefix*, per spec.md §9 ("Non-JSON response allow-list:
/// express as a table, not scattered conditionals").
const NON_JSON_ALLOW_LIST: &[&str] = &[
    "reboot",
    "setAlarmClock",
    "switchmode",
    "setLoopMode",
    "setPlayerCmd:switchmode:",
    "EQLoad",
];

/// Whether `command` is allowed to return a non-JSON body (growth-only
/// list per spec.md §9 open questions).
pub fn allows_non_json(command: &str) -> bool {
    NON_JSON_ALLOW_LIST
        .iter()
        .any(|prefix| command.starts_with(prefix))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::profile::DeviceProfile;

    #[test]
    fn mkii_prefers_get_status_ex() {
        let chain = endpoint_chain(LogicalEndpoint::PlayerStatus, &DeviceProfile::audio_pro_mkii());
        assert_eq!(chain[0], "getStatusEx");
        assert!(!chain.contains(&"getPlayerStatusEx"));
    }

    #[test]
    fn wiim_prefers_player_status_ex() {
        let chain = endpoint_chain(LogicalEndpoint::PlayerStatus, &DeviceProfile::wiim());
        assert_eq!(chain[0], "getPlayerStatusEx");
    }

    #[test]
    fn unsupported_endpoint_chain_is_empty() {
        let chain = endpoint_chain(LogicalEndpoint::Eq, &DeviceProfile::audio_pro_original());
        assert!(chain.is_empty());
    }

    #[test]
    fn non_json_allow_list_matches_prefix() {
        assert!(allows_non_json("setPlayerCmd:switchmode:bluetooth"));
        assert!(allows_non_json("EQLoad:Flat"));
        assert!(!allows_non_json("getPlayerStatusEx"));
    }
}
