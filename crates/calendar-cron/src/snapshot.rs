use crate::datastore::Datastore;
use crate::error::CronResult;
use shared_types::{CalendarPolicy, HostComplianceRow, Team};
use uuid::Uuid;

/// One team's calendar policies and the pass/fail state of its hosts
#[derive(Debug, Clone)]
pub struct ComplianceSnapshot {
    pub team_id: Uuid,
    pub policies: Vec<CalendarPolicy>,
    pub hosts: Vec<HostComplianceRow>,
}

/// Load the compliance state of `team` against its calendar policies.
///
/// Returns `None` when the team has no calendar-enabled policies, in which
/// case hosts are not queried at all.
pub async fn load_snapshot(
    datastore: &dyn Datastore,
    domain: &str,
    team: &Team,
) -> CronResult<Option<ComplianceSnapshot>> {
    let policies = datastore.calendar_policies(team.id).await?;
    if policies.is_empty() {
        return Ok(None);
    }

    let policy_ids: Vec<Uuid> = policies.iter().map(|p| p.id).collect();
    let hosts = datastore
        .team_host_compliance(domain, team.id, &policy_ids)
        .await?;

    tracing::debug!(
        "Loaded {} hosts against {} calendar policies for team {}",
        hosts.len(),
        policies.len(),
        team.name
    );

    Ok(Some(ComplianceSnapshot {
        team_id: team.id,
        policies,
        hosts,
    }))
}
