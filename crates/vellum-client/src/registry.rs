use std::collections::BTreeSet;

use tracing::debug;

use vellum_common::{HandshakeReply, Host};

/// The three disjoint views of the host universe.
///
/// - `known`: every host ever declared to belong to the deployment,
///   seeded from configuration and grown from handshake replies.
/// - `discovered`: hosts for which a pooled connection currently exists.
/// - `timed_out`: hosts whose most recent connection attempt failed;
///   emptied at the end of every discovery sweep so failures are retried
///   each heartbeat.
///
/// Invariants: `discovered ⊆ known`, `timed_out ⊆ known`,
/// `discovered ∩ timed_out = ∅`. Candidates for new connections are
/// `known − discovered − timed_out`. The sets are ordered so
/// [`next_candidate`](HostRegistry::next_candidate) is deterministic
/// given registry state.
#[derive(Debug)]
pub(crate) struct HostRegistry {
    known: BTreeSet<Host>,
    discovered: BTreeSet<Host>,
    timed_out: BTreeSet<Host>,
}

impl HostRegistry {
    pub(crate) fn new(seeds: impl IntoIterator<Item = Host>) -> Self {
        Self {
            known: seeds.into_iter().collect(),
            discovered: BTreeSet::new(),
            timed_out: BTreeSet::new(),
        }
    }

    /// Idempotent.
    pub(crate) fn insert_known(&mut self, host: Host) {
        self.known.insert(host);
    }

    /// Marks a host as currently pooled. Also inserts it into `known` and
    /// clears any timeout mark, keeping the sets disjoint.
    pub(crate) fn mark_discovered(&mut self, host: Host) {
        self.known.insert(host.clone());
        self.timed_out.remove(&host);
        self.discovered.insert(host);
    }

    /// Marks a host's most recent connection attempt as failed.
    pub(crate) fn mark_timed_out(&mut self, host: Host) {
        self.known.insert(host.clone());
        self.discovered.remove(&host);
        self.timed_out.insert(host);
    }

    /// Drops a host from the discovered set without timing it out.
    pub(crate) fn remove_discovered(&mut self, host: &Host) {
        self.discovered.remove(host);
    }

    /// Empties the timed-out set so the next routing pass retries
    /// previously failed hosts.
    pub(crate) fn reset_timeouts(&mut self) {
        self.timed_out.clear();
    }

    /// The smallest known host that is neither pooled nor timed out.
    pub(crate) fn next_candidate(&self) -> Option<Host> {
        self.known
            .iter()
            .find(|host| !self.discovered.contains(host) && !self.timed_out.contains(host))
            .cloned()
    }

    /// Folds a handshake reply's peer lists into the known set.
    ///
    /// A malformed entry must not poison the sweep: host strings that do
    /// not parse are skipped.
    pub(crate) fn fold_handshake(&mut self, reply: &HandshakeReply) {
        for peer in reply.peer_strings() {
            match peer.parse::<Host>() {
                Ok(host) => self.insert_known(host),
                Err(_) => debug!(peer, "skipping malformed host string in handshake reply"),
            }
        }
    }

    pub(crate) fn known(&self) -> &BTreeSet<Host> {
        &self.known
    }

    pub(crate) fn discovered(&self) -> &BTreeSet<Host> {
        &self.discovered
    }

    pub(crate) fn timed_out(&self) -> &BTreeSet<Host> {
        &self.timed_out
    }
}
