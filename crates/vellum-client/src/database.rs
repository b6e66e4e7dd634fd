use vellum_common::{Command, Result, ServerReply};

use crate::cluster::Cluster;
use crate::session::ClientSession;

/// Handle to one database of the deployment.
///
/// Created by [`Cluster::database`]; commands run under the handle's
/// implicit session and are dispatched through the cluster core like any
/// other.
#[derive(Clone)]
pub struct Database {
    cluster: Cluster,
    name: String,
    session: ClientSession,
}

impl Database {
    pub(crate) fn new(cluster: Cluster, name: String, session: ClientSession) -> Self {
        Self {
            cluster,
            name,
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Runs a command against this database.
    pub async fn run_command(&self, body: serde_json::Value) -> Result<ServerReply> {
        self.cluster
            .send(Command::new(&self.name, body), Some(&self.session))
            .await
    }
}
