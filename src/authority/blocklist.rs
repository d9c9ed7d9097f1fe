use log::{error, info};

use super::{Inner, Records, StateAuthority};
use crate::{
    blocklist::{compile_rules, normalize_site, RuleUpdate},
    error::CommandError,
    storage::RecordKey,
};

impl StateAuthority {
    /// Adding a site that is already blocked (in any spelling that normalises
    /// to the same pattern) succeeds without changing anything.
    pub async fn block_site(&self, raw_site: &str) -> Result<(), CommandError> {
        let pattern = normalize_site(raw_site).ok_or(CommandError::EmptySite)?;

        let mut records = self.inner.records.lock().await;
        if records.blocked_sites.contains(&pattern) {
            return Ok(());
        }

        info!("Blocking {pattern}");
        records.blocked_sites.push(pattern);
        self.inner.install_rules(&mut records);
        self.inner
            .persist(RecordKey::BlockedSites, &records.blocked_sites)
            .await;
        Ok(())
    }

    /// A blank or unknown site has nothing to unblock and succeeds unchanged.
    pub async fn unblock_site(&self, raw_site: &str) -> Result<(), CommandError> {
        let Some(pattern) = normalize_site(raw_site) else {
            return Ok(());
        };

        let mut records = self.inner.records.lock().await;
        let before = records.blocked_sites.len();
        records.blocked_sites.retain(|site| *site != pattern);
        if records.blocked_sites.len() == before {
            return Ok(());
        }

        info!("Unblocking {pattern}");
        self.inner.install_rules(&mut records);
        self.inner
            .persist(RecordKey::BlockedSites, &records.blocked_sites)
            .await;
        Ok(())
    }

    /// Regenerates and reinstalls the whole rule set from the current list.
    pub async fn recompile(&self) {
        let mut records = self.inner.records.lock().await;
        self.inner.install_rules(&mut records);
    }
}

impl Inner {
    pub(super) fn install_rules(&self, records: &mut Records) {
        let update = RuleUpdate::replace_all(
            &records.installed_rule_ids,
            compile_rules(&records.blocked_sites),
        );

        records.installed_rule_ids = match self.collaborators.rules.apply(&update) {
            Ok(()) => update.installed_ids(),
            Err(err) => {
                // Unknown what made it in; clear all of it next time.
                error!("Failed to replace blocking rules: {err:#}");
                update.remove_rule_ids
            }
        };
    }
}
