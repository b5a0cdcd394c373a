//! Ambiguity reporting shared by port and name resolution
//!
//! Every resolution path hands its candidates to [`settle`]. Two or more
//! distinct PIDs always end the resolution as ambiguous; there is no
//! tie-breaking between live candidates.

use crate::models::Target;
use crate::resolver::ResolutionOutcome;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::net::IpAddr;

/// Where a candidate PID came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// Leading PID of a running service-manager unit
    Service,
    /// Owner of a listening socket on these local addresses
    Listener { addresses: Vec<IpAddr> },
    /// Matched in the process table only
    Manual,
}

impl CandidateOrigin {
    fn rank(&self) -> u8 {
        match self {
            CandidateOrigin::Service => 0,
            CandidateOrigin::Listener { .. } => 1,
            CandidateOrigin::Manual => 2,
        }
    }

    /// Short label shown in the disambiguation listing
    pub fn label(&self) -> String {
        match self {
            CandidateOrigin::Service => "service".to_string(),
            CandidateOrigin::Manual => "manual".to_string(),
            CandidateOrigin::Listener { addresses } => addresses
                .iter()
                .map(IpAddr::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// One possible answer to an ambiguous query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub pid: u32,
    #[serde(flatten)]
    pub origin: CandidateOrigin,
    /// Command line of the candidate, for the operator to choose by
    pub description: String,
}

impl Candidate {
    pub fn new(pid: u32, origin: CandidateOrigin, description: impl Into<String>) -> Self {
        Self {
            pid,
            origin,
            description: description.into(),
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.origin
            .rank()
            .cmp(&other.origin.rank())
            .then(self.pid.cmp(&other.pid))
    }

    /// Fold another candidate for the same PID into this one
    fn absorb(&mut self, other: Candidate) {
        match (&mut self.origin, other.origin) {
            (CandidateOrigin::Listener { addresses }, CandidateOrigin::Listener { addresses: more }) => {
                for addr in more {
                    if !addresses.contains(&addr) {
                        addresses.push(addr);
                    }
                }
            }
            (mine, theirs) => {
                if theirs.rank() < mine.rank() {
                    *mine = theirs;
                }
            }
        }
        if self.description.is_empty() {
            self.description = other.description;
        }
    }
}

/// Two or more live candidates for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambiguity {
    pub target: Target,
    /// Sorted: service, then listener, then manual; PID ascending within each
    pub candidates: Vec<Candidate>,
}

/// One row of the disambiguation listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// 1-based position
    pub index: usize,
    pub pid: u32,
    pub label: String,
    pub description: String,
}

impl Ambiguity {
    pub fn pids(&self) -> Vec<u32> {
        self.candidates.iter().map(|c| c.pid).collect()
    }

    /// Ordered rows for presentation
    pub fn listing(&self) -> Vec<ListingRow> {
        self.candidates
            .iter()
            .enumerate()
            .map(|(i, c)| ListingRow {
                index: i + 1,
                pid: c.pid,
                label: c.origin.label(),
                description: c.description.clone(),
            })
            .collect()
    }
}

/// Merge candidates by PID and decide the outcome
///
/// Zero candidates is not-found, one distinct PID is resolved, anything more
/// is ambiguous.
pub fn settle(target: &Target, candidates: Vec<Candidate>) -> ResolutionOutcome {
    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match merged.iter_mut().find(|c| c.pid == candidate.pid) {
            Some(existing) => existing.absorb(candidate),
            None => merged.push(candidate),
        }
    }

    match merged.len() {
        0 => ResolutionOutcome::NotFound,
        1 => ResolutionOutcome::Resolved(merged[0].pid),
        _ => {
            merged.sort_by(|a, b| a.order(b));
            ResolutionOutcome::Ambiguous(Ambiguity {
                target: target.clone(),
                candidates: merged,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(addrs: &[&str]) -> CandidateOrigin {
        CandidateOrigin::Listener {
            addresses: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn test_settle_counts() {
        let target = Target::name("x");
        assert_eq!(settle(&target, vec![]), ResolutionOutcome::NotFound);
        assert_eq!(
            settle(
                &target,
                vec![
                    Candidate::new(9, CandidateOrigin::Manual, "x"),
                    Candidate::new(9, CandidateOrigin::Service, "x"),
                ]
            ),
            ResolutionOutcome::Resolved(9)
        );
    }

    #[test]
    fn test_ordering_service_first_then_pid() {
        let target = Target::name("nginx");
        let outcome = settle(
            &target,
            vec![
                Candidate::new(30, CandidateOrigin::Manual, "nginx: worker"),
                Candidate::new(12, CandidateOrigin::Manual, "nginx: master"),
                Candidate::new(500, CandidateOrigin::Service, "nginx -g daemon off;"),
            ],
        );
        let ResolutionOutcome::Ambiguous(amb) = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(amb.pids(), vec![500, 12, 30]);
        let rows = amb.listing();
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].label, "service");
        assert_eq!(rows[2].label, "manual");
    }

    #[test]
    fn test_same_pid_merges_to_best_origin() {
        let target = Target::name("redis");
        let outcome = settle(
            &target,
            vec![
                Candidate::new(7, CandidateOrigin::Manual, "redis-server"),
                Candidate::new(8, CandidateOrigin::Manual, "redis-cli"),
                Candidate::new(7, CandidateOrigin::Service, ""),
            ],
        );
        let ResolutionOutcome::Ambiguous(amb) = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(amb.candidates[0].pid, 7);
        assert_eq!(amb.candidates[0].origin, CandidateOrigin::Service);
        assert_eq!(amb.candidates[0].description, "redis-server");
    }

    #[test]
    fn test_listener_addresses_merge() {
        let target = Target::port("80");
        let outcome = settle(
            &target,
            vec![
                Candidate::new(100, listener(&["127.0.0.1"]), "nginx"),
                Candidate::new(200, listener(&["10.0.0.5"]), "apache2"),
                Candidate::new(100, listener(&["::1"]), "nginx"),
            ],
        );
        let ResolutionOutcome::Ambiguous(amb) = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(amb.candidates[0].origin.label(), "127.0.0.1, ::1");
        assert_eq!(amb.pids(), vec![100, 200]);
    }
}
