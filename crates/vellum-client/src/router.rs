use tracing::{debug, warn};

use vellum_common::{Error, Result};

use crate::cluster::ClusterCore;
use crate::connection::ConnectionId;

impl ClusterCore {
    /// Selects a pooled connection with the requested capability.
    ///
    /// 1. Scan the pool in insertion order. Closed entries and entries
    ///    without a handshake are scheduled for eviction and skipped; of
    ///    the entries that match, the **last** one wins (the most recently
    ///    inserted connection carries the freshest handshake).
    /// 2. On a pool miss, connect to candidate hosts from the registry.
    ///    Each failed attempt times the host out and the next candidate is
    ///    tried; a successful attempt is re-evaluated against the
    ///    requested capability and either returned or passed over.
    /// 3. With no candidates left, run one discovery sweep and re-scan
    ///    the pool. A second miss is terminal:
    ///    [`Error::NoAvailableHosts`].
    ///
    /// The returned connection is live at the moment of return but may
    /// close before the caller writes to it; the dispatcher handles that
    /// race.
    pub(crate) async fn get_connection(&self, writable: bool) -> Result<ConnectionId> {
        if let Some(id) = self.scan_pool(writable).await {
            return Ok(id);
        }

        loop {
            let candidate = {
                let state = self.state.lock().await;
                if state.shutting_down {
                    return Err(Error::ClusterClosed);
                }
                state.registry.next_candidate()
            };
            let Some(host) = candidate else { break };

            match self.open_connection(&host).await {
                Ok(_) => {
                    // The new entry is last in the pool; if it satisfies
                    // the request the re-scan picks it, otherwise move on
                    // to the next candidate.
                    if let Some(id) = self.scan_pool(writable).await {
                        return Ok(id);
                    }
                    debug!(%host, writable, "new connection lacks requested capability");
                }
                Err(e) => {
                    warn!(%host, error = %e, "connection attempt failed");
                    let mut state = self.state.lock().await;
                    state.registry.mark_timed_out(host);
                }
            }
        }

        self.rediscover().await?;
        if let Some(id) = self.scan_pool(writable).await {
            return Ok(id);
        }
        Err(Error::NoAvailableHosts)
    }

    /// One pass over the pool. Returns the last entry matching the
    /// capability, after running the eviction path for entries found
    /// closed or handshake-less.
    async fn scan_pool(&self, writable: bool) -> Option<ConnectionId> {
        let (stale, candidate) = {
            let state = self.state.lock().await;
            let mut stale = Vec::new();
            let mut candidate = None;
            for entry in state.pool.iter() {
                let handshake = match (&entry.handshake, entry.closed) {
                    (Some(handshake), false) => handshake,
                    _ => {
                        stale.push(entry.id);
                        continue;
                    }
                };
                let unwritable = writable && handshake.read_only;
                let unreadable = !entry.readable_secondary && !handshake.is_master;
                if unwritable || unreadable {
                    continue;
                }
                candidate = Some(entry.id);
            }
            (stale, candidate)
        };

        for id in stale {
            self.handle_connection_closed(
                id,
                Error::ConnectionClosed("stale pool entry".to_string()),
            )
            .await;
        }

        candidate
    }
}
