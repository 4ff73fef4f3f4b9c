// Duplicate extra repair for the library database
// Jellyfin can end up with two TypedBaseItems rows for the same file: one
// correctly linked as an extra (trailer, featurette, ...) of its parent and
// one left behind as a standalone item. The pass below removes the
// standalone copy and every reference to its user data key, then turns the
// empty ExtraIds strings it may leave behind into NULL, which is the only
// "no extras" marker the server accepts.

use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;

use crate::models::{format_guid, ExtrasList, IncorrectItem, PathGroup, ShadowingItem};

/// Standalone rows sharing a path with an extra
const SHADOWING_ITEMS_SQL: &str = r#"
    SELECT incorrect.UserDataKey AS user_data_key,
           incorrect.type AS kind,
           incorrect.ExtraIds AS extra_ids
    FROM TypedBaseItems correct
    INNER JOIN TypedBaseItems incorrect
        ON incorrect.Path = correct.Path AND correct.guid <> incorrect.guid
    WHERE correct.ExtraType IS NOT NULL AND incorrect.ExtraType IS NULL
"#;

/// Same join as above, selecting what is needed to delete and log
const INCORRECT_ITEMS_SQL: &str = r#"
    SELECT incorrect.guid AS guid,
           incorrect.Name AS name,
           incorrect.type AS kind,
           correct.ExtraType AS duplicated_extra_type
    FROM TypedBaseItems correct
    INNER JOIN TypedBaseItems incorrect
        ON incorrect.Path = correct.Path AND correct.guid <> incorrect.guid
    WHERE correct.ExtraType IS NOT NULL AND incorrect.ExtraType IS NULL
"#;

const PATH_GROUPS_SQL: &str = r#"
    SELECT Path AS path,
           COUNT(*) AS total,
           COUNT(ExtraType) AS extras
    FROM TypedBaseItems
    WHERE Path IS NOT NULL
    GROUP BY Path
    HAVING COUNT(*) > 1
    ORDER BY Path
"#;

/// How a repair pass is run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOptions {
    /// Run all steps in one transaction so a failure leaves nothing applied
    pub transactional: bool,

    /// Run the whole pass, log what it does, then roll everything back
    pub dry_run: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            transactional: true,
            dry_run: false,
        }
    }
}

/// User data keys of the incorrect rows, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    keys: Vec<String>,
    members: HashSet<String>,
}

impl Blacklist {
    /// Add a key; returns false if it was already present
    pub fn insert(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.keys.push(key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<String> for Blacklist {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut blacklist = Self::default();
        for key in iter {
            blacklist.insert(key);
        }
        blacklist
    }
}

/// Result of dropping blacklisted entries from one `ExtraIds` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedList {
    pub joined: String,
    pub before: usize,
    pub after: usize,
}

/// Remove blacklisted keys from a `'|'`-joined list
///
/// Returns `None` when nothing was removed. A list that loses every entry
/// joins to an empty string here.
pub fn purge_references(extra_ids: &str, blacklist: &Blacklist) -> Option<PurgedList> {
    let before: Vec<&str> = extra_ids.split('|').collect();
    let kept: Vec<&str> = before
        .iter()
        .copied()
        .filter(|id| !blacklist.contains(id))
        .collect();

    if kept.len() == before.len() {
        return None;
    }

    Some(PurgedList {
        joined: kept.join("|"),
        before: before.len(),
        after: kept.len(),
    })
}

/// Path collisions the repair does not handle as a simple pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Every row is standalone; left untouched
    NoExtra,
    /// Every row is an extra; left untouched
    AllExtras,
    /// More than two rows; all standalone rows among them are removed
    Crowded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAnomaly {
    pub path: String,
    pub rows: i64,
    pub extras: i64,
    pub kind: AnomalyKind,
}

/// Classify a group of rows sharing one path; `None` is the expected pair
pub fn classify(group: &PathGroup) -> Option<AnomalyKind> {
    if group.extras == 0 {
        Some(AnomalyKind::NoExtra)
    } else if group.extras == group.total {
        Some(AnomalyKind::AllExtras)
    } else if group.total > 2 {
        Some(AnomalyKind::Crowded)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub blacklisted_keys: usize,
    pub lists_rewritten: usize,
    pub rows_deleted: usize,
    pub empty_markers_cleared: u64,
    pub anomalies: Vec<PathAnomaly>,
    pub dry_run: bool,
}

impl RepairReport {
    /// True when the pass found nothing to change
    pub fn is_clean(&self) -> bool {
        self.lists_rewritten == 0 && self.rows_deleted == 0 && self.empty_markers_cleared == 0
    }
}

/// Runs the duplicate extra repair against an open library database
pub struct ExtrasRepairer {
    pool: SqlitePool,
    options: RepairOptions,
}

impl ExtrasRepairer {
    pub fn new(pool: SqlitePool, options: RepairOptions) -> Self {
        Self { pool, options }
    }

    pub async fn run(&self) -> Result<RepairReport> {
        if self.options.transactional || self.options.dry_run {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction")?;

            // Dropping `tx` on error rolls back every step
            let mut report = repair_pass(&mut tx).await?;

            if self.options.dry_run {
                tx.rollback().await.context("Failed to roll back dry run")?;
                report.dry_run = true;
                tracing::info!("Dry run: all changes rolled back");
            } else {
                tx.commit().await.context("Failed to commit repair")?;
            }

            Ok(report)
        } else {
            let mut conn = self
                .pool
                .acquire()
                .await
                .context("Failed to acquire database connection")?;
            repair_pass(&mut conn).await
        }
    }
}

async fn repair_pass(conn: &mut SqliteConnection) -> Result<RepairReport> {
    let anomalies = find_anomalies(conn).await?;

    tracing::info!("Building list of incorrect UserDataKeys to fix...");
    let blacklist = collect_blacklist(conn).await?;
    tracing::info!("Found {} incorrect UserDataKeys", blacklist.len());
    tracing::debug!("Incorrect UserDataKeys: {:?}", blacklist.keys());

    tracing::info!("Removing incorrect UserDataKeys...");
    let lists_rewritten = purge_blacklisted(conn, &blacklist).await?;

    tracing::info!("Deleting incorrect items...");
    let rows_deleted = delete_incorrect(conn).await?;

    let empty_markers_cleared = clear_empty_markers(conn).await?;

    Ok(RepairReport {
        blacklisted_keys: blacklist.len(),
        lists_rewritten,
        rows_deleted,
        empty_markers_cleared,
        anomalies,
        dry_run: false,
    })
}

/// Report path collisions that are not a single extra/standalone pair
pub async fn find_anomalies(conn: &mut SqliteConnection) -> Result<Vec<PathAnomaly>> {
    let groups: Vec<PathGroup> = sqlx::query_as(PATH_GROUPS_SQL)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to group items by path")?;

    let anomalies: Vec<PathAnomaly> = groups
        .into_iter()
        .filter_map(|group| {
            classify(&group).map(|kind| PathAnomaly {
                path: group.path,
                rows: group.total,
                extras: group.extras,
                kind,
            })
        })
        .collect();

    for anomaly in &anomalies {
        match anomaly.kind {
            AnomalyKind::NoExtra => tracing::warn!(
                "{} standalone items share {} with no extra; left untouched",
                anomaly.rows,
                anomaly.path
            ),
            AnomalyKind::AllExtras => tracing::warn!(
                "{} extras share {}; left untouched",
                anomaly.rows,
                anomaly.path
            ),
            AnomalyKind::Crowded => tracing::warn!(
                "{} items ({} extras) share {}; every standalone one will be removed",
                anomaly.rows,
                anomaly.extras,
                anomaly.path
            ),
        }
    }

    Ok(anomalies)
}

/// User data keys of every standalone row shadowing an extra
pub async fn collect_blacklist(conn: &mut SqliteConnection) -> Result<Blacklist> {
    let rows: Vec<ShadowingItem> = sqlx::query_as(SHADOWING_ITEMS_SQL)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to look up duplicated extras")?;

    let mut blacklist = Blacklist::default();
    for row in rows {
        match row.user_data_key {
            Some(key) => {
                if blacklist.insert(key) {
                    let own_extras = row
                        .extra_ids
                        .as_deref()
                        .map(|ids| ids.split('|').count())
                        .unwrap_or(0);
                    tracing::debug!("Blacklisted {} ({} extra ids)", row.kind, own_extras);
                }
            }
            None => tracing::debug!("Skipping {} without a UserDataKey", row.kind),
        }
    }

    Ok(blacklist)
}

/// Drop blacklisted keys from every `ExtraIds` list
pub async fn purge_blacklisted(
    conn: &mut SqliteConnection,
    blacklist: &Blacklist,
) -> Result<usize> {
    if blacklist.is_empty() {
        return Ok(0);
    }

    let lists: Vec<ExtrasList> =
        sqlx::query_as("SELECT guid, ExtraIds AS extra_ids, Name AS name FROM TypedBaseItems")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to read extras lists")?;

    let mut rewritten = 0;
    for list in lists {
        let Some(extra_ids) = list.extra_ids.as_deref().filter(|ids| !ids.is_empty()) else {
            continue;
        };

        let Some(purged) = purge_references(extra_ids, blacklist) else {
            continue;
        };

        tracing::info!(
            "{} {}: {} -> {} extras",
            format_guid(&list.guid),
            list.name.as_deref().unwrap_or(""),
            purged.before,
            purged.after
        );

        sqlx::query("UPDATE TypedBaseItems SET ExtraIds = ? WHERE guid = ?")
            .bind(&purged.joined)
            .bind(&list.guid)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to update extras of {}", format_guid(&list.guid)))?;

        rewritten += 1;
    }

    Ok(rewritten)
}

/// Delete the standalone duplicates, re-reading the join
pub async fn delete_incorrect(conn: &mut SqliteConnection) -> Result<usize> {
    let rows: Vec<IncorrectItem> = sqlx::query_as(INCORRECT_ITEMS_SQL)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to look up incorrect items")?;

    let mut deleted: HashSet<Vec<u8>> = HashSet::new();
    for row in rows {
        if deleted.contains(&row.guid) {
            continue;
        }

        tracing::info!(
            "Deleting {} {:?} (duplicate of {})",
            row.kind,
            row.name.as_deref().unwrap_or(""),
            row.duplicated_extra_type.as_deref().unwrap_or("extra")
        );

        sqlx::query("DELETE FROM TypedBaseItems WHERE guid = ?")
            .bind(&row.guid)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to delete {}", format_guid(&row.guid)))?;

        deleted.insert(row.guid);
    }

    Ok(deleted.len())
}

/// Turn empty `ExtraIds` strings into NULL
pub async fn clear_empty_markers(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("UPDATE TypedBaseItems SET ExtraIds = NULL WHERE ExtraIds = ''")
        .execute(&mut *conn)
        .await
        .context("Failed to clear empty ExtraIds")?;

    let cleared = result.rows_affected();
    if cleared > 0 {
        tracing::info!("Cleared {} empty ExtraIds values", cleared);
    }

    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE TypedBaseItems (
                guid GUID PRIMARY KEY NOT NULL,
                type TEXT NOT NULL,
                Path TEXT NULL,
                ExtraType TEXT NULL,
                ExtraIds TEXT NULL,
                Name TEXT NULL,
                UserDataKey TEXT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn guid(n: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[15] = n;
        bytes
    }

    struct Item {
        id: u8,
        kind: &'static str,
        path: Option<&'static str>,
        extra_type: Option<&'static str>,
        extra_ids: Option<&'static str>,
        user_data_key: Option<&'static str>,
    }

    impl Item {
        fn new(id: u8) -> Self {
            Self {
                id,
                kind: "MediaBrowser.Controller.Entities.Movies.Movie",
                path: None,
                extra_type: None,
                extra_ids: None,
                user_data_key: None,
            }
        }

        fn at(mut self, path: &'static str) -> Self {
            self.path = Some(path);
            self
        }

        fn extra(mut self, extra_type: &'static str) -> Self {
            self.kind = "MediaBrowser.Controller.Entities.Trailer";
            self.extra_type = Some(extra_type);
            self
        }

        fn extras(mut self, extra_ids: &'static str) -> Self {
            self.extra_ids = Some(extra_ids);
            self
        }

        fn key(mut self, user_data_key: &'static str) -> Self {
            self.user_data_key = Some(user_data_key);
            self
        }

        async fn insert(self, pool: &SqlitePool) {
            sqlx::query(
                r#"
                INSERT INTO TypedBaseItems (guid, type, Path, ExtraType, ExtraIds, Name, UserDataKey)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(guid(self.id))
            .bind(self.kind)
            .bind(self.path)
            .bind(self.extra_type)
            .bind(self.extra_ids)
            .bind(format!("item {}", self.id))
            .bind(self.user_data_key)
            .execute(pool)
            .await
            .unwrap();
        }
    }

    /// None when the row is gone, Some(ExtraIds) otherwise
    async fn extra_ids_of(pool: &SqlitePool, id: u8) -> Option<Option<String>> {
        sqlx::query_as::<_, (Option<String>,)>("SELECT ExtraIds FROM TypedBaseItems WHERE guid = ?")
            .bind(guid(id))
            .fetch_optional(pool)
            .await
            .unwrap()
            .map(|(ids,)| ids)
    }

    async fn snapshot(pool: &SqlitePool) -> Vec<(Vec<u8>, Option<String>, Option<String>)> {
        sqlx::query_as("SELECT guid, ExtraType, ExtraIds FROM TypedBaseItems ORDER BY guid")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    /// Standalone A and trailer B share /m/x; C references A's key
    async fn seed_example(pool: &SqlitePool, c_extra_ids: &'static str) {
        Item::new(1).at("/m/x").key("UDK1").insert(pool).await;
        Item::new(2).at("/m/x").extra("Trailer").key("UDK2").insert(pool).await;
        Item::new(3).at("/m/c").extras(c_extra_ids).key("UDK3").insert(pool).await;
    }

    fn autocommit() -> RepairOptions {
        RepairOptions {
            transactional: false,
            dry_run: false,
        }
    }

    async fn block_deletes(pool: &SqlitePool) {
        sqlx::query(
            r#"
            CREATE TRIGGER block_delete BEFORE DELETE ON TypedBaseItems
            BEGIN SELECT RAISE(ABORT, 'blocked'); END
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn test_blacklist_dedupes_in_first_seen_order() {
        let blacklist: Blacklist = ["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(blacklist.keys(), ["b", "a", "c"]);
        assert!(blacklist.contains("c"));
        assert!(!blacklist.contains("d"));
    }

    #[test]
    fn test_purge_references() {
        let blacklist: Blacklist = ["UDK1".to_string()].into_iter().collect();

        assert_eq!(
            purge_references("UDK1|UDK9", &blacklist),
            Some(PurgedList {
                joined: "UDK9".to_string(),
                before: 2,
                after: 1
            })
        );
        assert_eq!(purge_references("UDK9|UDK8", &blacklist), None);

        let emptied = purge_references("UDK1|UDK1", &blacklist).unwrap();
        assert_eq!(emptied.joined, "");
        assert_eq!((emptied.before, emptied.after), (2, 0));
    }

    #[test]
    fn test_classify_path_groups() {
        let group = |total, extras| PathGroup {
            path: "/m".to_string(),
            total,
            extras,
        };
        assert_eq!(classify(&group(2, 1)), None);
        assert_eq!(classify(&group(2, 0)), Some(AnomalyKind::NoExtra));
        assert_eq!(classify(&group(3, 3)), Some(AnomalyKind::AllExtras));
        assert_eq!(classify(&group(3, 1)), Some(AnomalyKind::Crowded));
    }

    #[tokio::test]
    async fn test_repairs_example_scenario() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1|UDK9").await;

        let report = ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(extra_ids_of(&pool, 1).await, None);
        assert_eq!(extra_ids_of(&pool, 2).await, Some(None));
        assert_eq!(extra_ids_of(&pool, 3).await, Some(Some("UDK9".to_string())));

        assert_eq!(report.blacklisted_keys, 1);
        assert_eq!(report.lists_rewritten, 1);
        assert_eq!(report.rows_deleted, 1);
        assert_eq!(report.empty_markers_cleared, 0);
        assert!(report.anomalies.is_empty());
        assert!(!report.dry_run);
    }

    #[tokio::test]
    async fn test_emptied_list_becomes_null() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1").await;

        let report = ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(extra_ids_of(&pool, 3).await, Some(None));
        assert_eq!(report.empty_markers_cleared, 1);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1|UDK9").await;
        let repairer = ExtrasRepairer::new(pool.clone(), RepairOptions::default());

        repairer.run().await.unwrap();
        let after_first = snapshot(&pool).await;

        let second = repairer.run().await.unwrap();
        assert!(second.is_clean());
        assert_eq!(second.blacklisted_keys, 0);
        assert_eq!(snapshot(&pool).await, after_first);
    }

    #[tokio::test]
    async fn test_unrelated_rows_untouched() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1|UDK9").await;
        Item::new(4).at("/m/y").extras("UDK7|UDK8").insert(&pool).await;
        Item::new(5).at("/m/z").extras("").insert(&pool).await;
        Item::new(6).insert(&pool).await;

        ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(
            extra_ids_of(&pool, 4).await,
            Some(Some("UDK7|UDK8".to_string()))
        );
        // Only the empty marker normalisation applies to an unrelated row
        assert_eq!(extra_ids_of(&pool, 5).await, Some(None));
        assert_eq!(extra_ids_of(&pool, 6).await, Some(None));
    }

    #[tokio::test]
    async fn test_dry_run_rolls_back() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1").await;
        let before = snapshot(&pool).await;

        let options = RepairOptions {
            dry_run: true,
            ..RepairOptions::default()
        };
        let report = ExtrasRepairer::new(pool.clone(), options)
            .run()
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.rows_deleted, 1);
        assert_eq!(report.lists_rewritten, 1);
        assert_eq!(report.empty_markers_cleared, 1);
        assert_eq!(snapshot(&pool).await, before);
    }

    #[tokio::test]
    async fn test_autocommit_mode_repairs_too() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK9|UDK1").await;

        ExtrasRepairer::new(pool.clone(), autocommit())
            .run()
            .await
            .unwrap();

        assert_eq!(extra_ids_of(&pool, 1).await, None);
        assert_eq!(extra_ids_of(&pool, 3).await, Some(Some("UDK9".to_string())));
    }

    #[tokio::test]
    async fn test_failed_delete_rolls_back_purge() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1|UDK9").await;
        block_deletes(&pool).await;

        let result = ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await;

        assert!(result.is_err());
        assert_eq!(
            extra_ids_of(&pool, 3).await,
            Some(Some("UDK1|UDK9".to_string()))
        );
        assert_eq!(extra_ids_of(&pool, 1).await, Some(None));
    }

    #[tokio::test]
    async fn test_failed_delete_without_transaction_leaves_purge_applied() {
        let pool = test_pool().await;
        seed_example(&pool, "UDK1|UDK9").await;
        block_deletes(&pool).await;

        let result = ExtrasRepairer::new(pool.clone(), autocommit()).run().await;

        assert!(result.is_err());
        assert_eq!(extra_ids_of(&pool, 3).await, Some(Some("UDK9".to_string())));
        assert_eq!(extra_ids_of(&pool, 1).await, Some(None));
    }

    #[tokio::test]
    async fn test_crowded_path_deletes_each_standalone_once() {
        let pool = test_pool().await;
        Item::new(1).at("/m/w").key("K1").insert(&pool).await;
        Item::new(2).at("/m/w").key("K2").insert(&pool).await;
        Item::new(3).at("/m/w").extra("Trailer").key("K3").insert(&pool).await;
        Item::new(4).at("/m/w").extra("Featurette").key("K4").insert(&pool).await;
        Item::new(5).at("/m/p").extras("K1|K2|K3").insert(&pool).await;

        let report = ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.blacklisted_keys, 2);
        assert_eq!(report.rows_deleted, 2);
        assert_eq!(extra_ids_of(&pool, 1).await, None);
        assert_eq!(extra_ids_of(&pool, 2).await, None);
        assert_eq!(extra_ids_of(&pool, 5).await, Some(Some("K3".to_string())));
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Crowded);
        assert_eq!(report.anomalies[0].rows, 4);
    }

    #[tokio::test]
    async fn test_anomalous_groups_left_untouched() {
        let pool = test_pool().await;
        Item::new(1).at("/m/a").key("A1").insert(&pool).await;
        Item::new(2).at("/m/a").key("A2").insert(&pool).await;
        Item::new(3).at("/m/b").extra("Trailer").insert(&pool).await;
        Item::new(4).at("/m/b").extra("Trailer").insert(&pool).await;
        Item::new(5).at("/m/c").extras("A1|A2").insert(&pool).await;

        let report = ExtrasRepairer::new(pool.clone(), RepairOptions::default())
            .run()
            .await
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(snapshot(&pool).await.len(), 5);
        let kinds: Vec<AnomalyKind> = report.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnomalyKind::NoExtra, AnomalyKind::AllExtras]);
    }

    #[tokio::test]
    async fn test_standalone_without_key_is_still_deleted() {
        let pool = test_pool().await;
        Item::new(1).at("/m/x").insert(&pool).await;
        Item::new(2).at("/m/x").extra("Trailer").key("K2").insert(&pool).await;
        Item::new(3).at("/m/y").key("K3").insert(&pool).await;
        Item::new(4).at("/m/y").extra("Trailer").key("K4").insert(&pool).await;
        Item::new(5).at("/m/y").extra("Featurette").key("K5").insert(&pool).await;
        Item::new(6).at("/m/z").extras("K3|K3").insert(&pool).await;
        let repairer = ExtrasRepairer::new(pool.clone(), RepairOptions::default());

        let report = repairer.run().await.unwrap();

        assert_eq!(report.blacklisted_keys, 1);
        assert_eq!(report.lists_rewritten, 1);
        assert_eq!(report.rows_deleted, 2);
        assert_eq!(report.empty_markers_cleared, 1);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].path, "/m/y");
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Crowded);
        assert_eq!(extra_ids_of(&pool, 1).await, None);
        assert_eq!(extra_ids_of(&pool, 3).await, None);
        assert_eq!(extra_ids_of(&pool, 2).await, Some(None));
        assert_eq!(extra_ids_of(&pool, 6).await, Some(None));

        let second = repairer.run().await.unwrap();
        assert!(second.is_clean());
        assert_eq!(second.blacklisted_keys, 0);
        // Only the two extras remain on /m/y
        let kinds: Vec<AnomalyKind> = second.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnomalyKind::AllExtras]);
    }
}
