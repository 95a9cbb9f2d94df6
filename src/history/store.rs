// Per-application click ledger.
//
// Exactly one application's history is resident at a time. Points are kept
// in normalized form on disk so a ledger survives resolution and layout
// changes; local coordinates are re-derived from the live topology on load.
use chrono::Utc;

use crate::display::transform::CoordinateTransformer;
use crate::display::types::{LocalPoint, NormalizedPoint};
use crate::errors::ScreenPointResult;
use crate::history::ledger::DynLedgerStore;
use crate::history::types::{AnnotationCandidate, AppClickHistory, ClickHistoryEntry, StoredClickHistoryEntry};

/// App context used when a click is recorded before any app was selected.
pub const DEFAULT_APP: &str = "desktop";

/// Clicks whose normalized coordinates differ by at most this much on both
/// axes are the same location.
pub const MERGE_TOLERANCE: u32 = 1;

pub struct ClickHistoryStore {
    ledger: DynLedgerStore,
    app_name: Option<String>,
    entries: Vec<ClickHistoryEntry>,
    counter: u64,
    last_touched: Option<u64>,
}

impl ClickHistoryStore {
    pub fn new(ledger: DynLedgerStore) -> Self {
        Self {
            ledger,
            app_name: None,
            entries: Vec::new(),
            counter: 0,
            last_touched: None,
        }
    }

    pub fn active_app(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn entries(&self) -> &[ClickHistoryEntry] {
        &self.entries
    }

    /// Makes `app_name` the active context and loads its ledger.
    ///
    /// A missing ledger yields an empty history. Entries on displays that no
    /// longer exist are skipped.
    pub async fn load(&mut self, app_name: &str, transformer: &CoordinateTransformer) -> ScreenPointResult<()> {
        let stored = self.ledger.read(app_name).await?;

        self.app_name = Some(app_name.to_string());
        self.entries.clear();
        self.counter = 0;
        self.last_touched = None;

        let Some(history) = stored else {
            tracing::info!(app = %app_name, "no click history yet; starting fresh");
            return Ok(());
        };

        let topology = transformer.topology();
        let mut skipped = 0usize;
        for s in history.clicks {
            if !topology.has_display(s.display_index) {
                tracing::warn!(
                    app = %app_name,
                    index = s.index,
                    display = s.display_index,
                    "skipping history entry for missing display"
                );
                skipped += 1;
                continue;
            }
            let local = transformer.normalized_to_local(s.x_normalized as f64, s.y_normalized as f64, s.display_index);
            let normalized = NormalizedPoint {
                x: s.x_normalized.min(1000),
                y: s.y_normalized.min(1000),
            };
            self.counter = self.counter.max(s.index + 1);
            self.entries.push(ClickHistoryEntry {
                index: s.index,
                display_index: s.display_index,
                x: local.x,
                y: local.y,
                normalized,
                timestamp: s.timestamp,
                operation: s.operation,
                count: s.count,
                success_count: s.success_count,
            });
        }
        self.counter = self.counter.max(history.counter);

        tracing::info!(
            app = %app_name,
            loaded = self.entries.len(),
            skipped,
            "click history loaded"
        );
        Ok(())
    }

    /// Records a click at `local` and persists the ledger.
    ///
    /// A click within [`MERGE_TOLERANCE`] of an existing entry's normalized
    /// point on the same display bumps that entry's count; otherwise a new
    /// entry with a fresh index is appended.
    pub async fn record_click(
        &mut self,
        local: LocalPoint,
        display_index: usize,
        operation: &str,
        transformer: &CoordinateTransformer,
    ) -> ScreenPointResult<ClickHistoryEntry> {
        if self.app_name.is_none() {
            self.load(DEFAULT_APP, transformer).await?;
        }

        let normalized = transformer.local_to_normalized(local, display_index);
        let now = Utc::now();

        let existing = self.entries.iter_mut().find(|e| {
            e.display_index == display_index
                && e.normalized.x.abs_diff(normalized.x) <= MERGE_TOLERANCE
                && e.normalized.y.abs_diff(normalized.y) <= MERGE_TOLERANCE
        });

        let entry = match existing {
            Some(e) => {
                e.count += 1;
                e.timestamp = now;
                e.operation = operation.to_string();
                tracing::debug!(index = e.index, count = e.count, "click merged into existing entry");
                e.clone()
            }
            None => {
                let entry = ClickHistoryEntry {
                    index: self.counter,
                    display_index,
                    x: local.x,
                    y: local.y,
                    normalized,
                    timestamp: now,
                    operation: operation.to_string(),
                    count: 1,
                    success_count: 0,
                };
                self.counter += 1;
                tracing::debug!(index = entry.index, x = local.x, y = local.y, display = display_index, "new click entry");
                self.entries.push(entry.clone());
                entry
            }
        };

        self.last_touched = Some(entry.index);
        self.persist(transformer).await?;
        Ok(entry)
    }

    /// Applies a verifier's verdict to the most recent click.
    /// Only a successful verdict changes anything; `count` is never touched.
    pub async fn record_outcome(
        &mut self,
        successful: bool,
        transformer: &CoordinateTransformer,
    ) -> ScreenPointResult<Option<ClickHistoryEntry>> {
        let Some(index) = self.last_touched else {
            tracing::debug!("outcome reported with no recorded click");
            return Ok(None);
        };
        let Some(entry) = self.entries.iter_mut().find(|e| e.index == index) else {
            return Ok(None);
        };
        if !successful {
            tracing::debug!(index, "click reported ineffective");
            return Ok(Some(entry.clone()));
        }
        entry.success_count += 1;
        let updated = entry.clone();
        self.persist(transformer).await?;
        Ok(Some(updated))
    }

    /// Drops the in-memory history and deletes the ledger for `app_name`.
    pub async fn clear(&mut self, app_name: &str) -> ScreenPointResult<()> {
        self.ledger.delete(app_name).await?;
        if self.app_name.as_deref() == Some(app_name) {
            self.entries.clear();
            self.counter = 0;
            self.last_touched = None;
        }
        tracing::info!(app = %app_name, "click history cleared");
        Ok(())
    }

    /// Picks a small, visually unambiguous set of history points to overlay.
    ///
    /// Rank 0 is always the most recent click on the display. The rest are
    /// ranked by `success_count * 2 + count`, ties broken by recency, and
    /// accepted greedily while at least `min_pixel_separation` device pixels
    /// from every point already accepted.
    pub fn select_annotation_set(
        &self,
        display_index: usize,
        max_markers: usize,
        min_pixel_separation: f64,
        transformer: &CoordinateTransformer,
    ) -> Vec<AnnotationCandidate> {
        if max_markers == 0 {
            return Vec::new();
        }
        let scale = transformer.display(display_index).scale_factor;

        let mut candidates: Vec<&ClickHistoryEntry> =
            self.entries.iter().filter(|e| e.display_index == display_index).collect();
        let Some(latest_pos) = candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.timestamp, e.index))
            .map(|(i, _)| i)
        else {
            return Vec::new();
        };
        let latest = candidates.swap_remove(latest_pos);

        candidates.sort_by(|a, b| {
            b.score()
                .cmp(&a.score())
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| b.index.cmp(&a.index))
        });

        let mut accepted: Vec<&ClickHistoryEntry> = vec![latest];
        for candidate in candidates {
            if accepted.len() >= max_markers {
                break;
            }
            let far_enough = accepted.iter().all(|a| {
                let dx = (a.x - candidate.x) as f64 * scale;
                let dy = (a.y - candidate.y) as f64 * scale;
                (dx * dx + dy * dy).sqrt() >= min_pixel_separation
            });
            if far_enough {
                accepted.push(candidate);
            }
        }

        accepted
            .into_iter()
            .enumerate()
            .map(|(rank, e)| AnnotationCandidate { rank, entry: e.clone() })
            .collect()
    }

    async fn persist(&self, transformer: &CoordinateTransformer) -> ScreenPointResult<()> {
        let Some(app_name) = &self.app_name else {
            return Ok(());
        };
        let clicks = self
            .entries
            .iter()
            .map(|e| {
                let d = transformer.display(e.display_index);
                StoredClickHistoryEntry {
                    index: e.index,
                    display_index: e.display_index,
                    x_normalized: e.normalized.x,
                    y_normalized: e.normalized.y,
                    display_width: d.width,
                    display_height: d.height,
                    timestamp: e.timestamp,
                    operation: e.operation.clone(),
                    count: e.count,
                    success_count: e.success_count,
                }
            })
            .collect();
        let history = AppClickHistory {
            app_name: app_name.clone(),
            last_updated: Utc::now(),
            clicks,
            counter: self.counter,
        };
        self.ledger.write(&history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::topology::normalize;
    use crate::display::types::{OriginFrame, RawDisplay};
    use crate::history::ledger::{JsonFileLedger, LedgerStore};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use std::time::Duration;

    fn transformer(displays: &[(u32, u32, f64)]) -> CoordinateTransformer {
        let mut x = 0;
        let raw = displays
            .iter()
            .enumerate()
            .map(|(i, &(w, h, s))| {
                let d = RawDisplay {
                    name: format!("D{i}"),
                    is_main: i == 0,
                    width: w,
                    height: h,
                    origin_x: x,
                    origin_y: 0,
                    scale_factor: s,
                    frame: OriginFrame::TopLeft,
                };
                x += w as i32;
                d
            })
            .collect();
        CoordinateTransformer::new(Arc::new(normalize(raw)))
    }

    fn store(dir: &tempfile::TempDir) -> (ClickHistoryStore, Arc<JsonFileLedger>) {
        let ledger = Arc::new(JsonFileLedger::new(dir.path().to_path_buf(), Duration::from_secs(5)));
        (ClickHistoryStore::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn nearby_clicks_merge() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store(&dir);
        let t = transformer(&[(1000, 1000, 1.0)]);
        store.load("Safari", &t).await.unwrap();

        store.record_click(LocalPoint::new(100, 100), 0, "click", &t).await.unwrap();
        let merged = store.record_click(LocalPoint::new(101, 99), 0, "double_click", &t).await.unwrap();

        assert_eq!(store.entries().len(), 1);
        assert_eq!(merged.count, 2);
        assert_eq!(merged.index, 0);
        assert_eq!(merged.operation, "double_click");
        assert_eq!((merged.x, merged.y), (100, 100));
    }

    #[tokio::test]
    async fn distinct_clicks_get_monotonic_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store(&dir);
        let t = transformer(&[(1000, 1000, 1.0), (1000, 1000, 1.0)]);
        store.load("Safari", &t).await.unwrap();

        let a = store.record_click(LocalPoint::new(100, 100), 0, "click", &t).await.unwrap();
        let b = store.record_click(LocalPoint::new(500, 500), 0, "click", &t).await.unwrap();
        // Same coordinates on another display is a different location.
        let c = store.record_click(LocalPoint::new(100, 100), 1, "click", &t).await.unwrap();
        assert_eq!((a.index, b.index, c.index), (0, 1, 2));

        store.clear("Safari").await.unwrap();
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn reload_rederives_local_points_from_current_topology() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store(&dir);
        let small = transformer(&[(1000, 500, 1.0)]);
        store.load("Notes", &small).await.unwrap();
        store.record_click(LocalPoint::new(500, 250), 0, "click", &small).await.unwrap();
        store.record_click(LocalPoint::new(900, 100), 0, "click", &small).await.unwrap();

        let large = transformer(&[(2000, 1000, 1.0)]);
        let (mut reloaded, _) = self::store(&dir);
        reloaded.load("Notes", &large).await.unwrap();
        let entries = reloaded.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].x, entries[0].y), (1000, 500));
        assert_eq!(entries[0].normalized, NormalizedPoint { x: 500, y: 500 });

        // Counter continues after the highest stored index.
        let next = reloaded.record_click(LocalPoint::new(10, 10), 0, "click", &large).await.unwrap();
        assert_eq!(next.index, 2);
    }

    #[tokio::test]
    async fn entries_for_missing_displays_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store(&dir);
        let two = transformer(&[(1000, 1000, 1.0), (1000, 1000, 1.0)]);
        store.load("Mail", &two).await.unwrap();
        store.record_click(LocalPoint::new(10, 10), 0, "click", &two).await.unwrap();
        store.record_click(LocalPoint::new(10, 10), 1, "click", &two).await.unwrap();

        let one = transformer(&[(1000, 1000, 1.0)]);
        store.load("Mail", &one).await.unwrap();
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.entries()[0].display_index, 0);
    }

    #[tokio::test]
    async fn outcome_only_touches_success_count() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, ledger) = store(&dir);
        let t = transformer(&[(1000, 1000, 1.0)]);
        store.load("Terminal", &t).await.unwrap();

        assert!(store.record_outcome(true, &t).await.unwrap().is_none());

        store.record_click(LocalPoint::new(300, 300), 0, "click", &t).await.unwrap();
        let failed = store.record_outcome(false, &t).await.unwrap().unwrap();
        assert_eq!(failed.success_count, 0);
        let ok = store.record_outcome(true, &t).await.unwrap().unwrap();
        assert_eq!((ok.count, ok.success_count), (1, 1));

        let stored = ledger.read("Terminal").await.unwrap().unwrap();
        assert_eq!(stored.clicks[0].success_count, 1);
        assert_eq!(stored.clicks[0].x_normalized, 300);
        assert_eq!(stored.clicks[0].display_width, 1000);
    }

    #[tokio::test]
    async fn first_click_without_app_uses_default_context() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, ledger) = store(&dir);
        let t = transformer(&[(1000, 1000, 1.0)]);
        store.record_click(LocalPoint::new(1, 1), 0, "click", &t).await.unwrap();
        assert_eq!(store.active_app(), Some(DEFAULT_APP));
        assert!(ledger.read(DEFAULT_APP).await.unwrap().is_some());
    }

    fn seeded(entries: Vec<ClickHistoryEntry>) -> ClickHistoryStore {
        let dir = std::env::temp_dir();
        let ledger = Arc::new(JsonFileLedger::new(dir, Duration::from_secs(1)));
        let mut store = ClickHistoryStore::new(ledger);
        store.counter = entries.len() as u64;
        store.entries = entries;
        store
    }

    fn entry(index: u64, x: i32, y: i32, count: u32, success: u32, age_secs: i64) -> ClickHistoryEntry {
        ClickHistoryEntry {
            index,
            display_index: 0,
            x,
            y,
            normalized: NormalizedPoint { x: x as u32, y: y as u32 },
            timestamp: Utc::now() - ChronoDuration::seconds(age_secs),
            operation: "click".into(),
            count,
            success_count: success,
        }
    }

    #[test]
    fn annotation_set_is_capped_and_starts_with_latest() {
        let t = transformer(&[(1000, 1000, 1.0)]);
        // 50 distinct points packed into a 10x5 px block; index 17 is newest.
        let entries = (0..50u64)
            .map(|i| {
                let age = if i == 17 { 0 } else { 100 + i as i64 };
                entry(i, 100 + (i % 10) as i32, 100 + (i / 10) as i32, (i % 7) as u32 + 1, 0, age)
            })
            .collect();
        let store = seeded(entries);
        let set = store.select_annotation_set(0, 5, 1.0, &t);
        assert_eq!(set.len(), 5);
        assert_eq!(set[0].rank, 0);
        assert_eq!(set[0].entry.index, 17);
        assert!(set.iter().enumerate().all(|(i, c)| c.rank == i));
    }

    #[test]
    fn default_separation_takes_precedence_over_marker_cap() {
        let locator = crate::config::LocatorConfig::default();
        let t = transformer(&[(1000, 1000, 1.0)]);

        // A 10x5 px cluster is one visual spot at 40 px separation: only the
        // latest click is drawn, however many markers are allowed.
        let clustered = (0..50u64)
            .map(|i| {
                let age = if i == 17 { 0 } else { 100 + i as i64 };
                entry(i, 100 + (i % 10) as i32, 100 + (i / 10) as i32, (i % 7) as u32 + 1, 0, age)
            })
            .collect();
        let set = seeded(clustered).select_annotation_set(
            0,
            locator.max_markers,
            locator.min_marker_separation_px,
            &t,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].entry.index, 17);

        // Points on a 50 px grid clear the separation, so the cap applies.
        let spread = (0..50u64)
            .map(|i| entry(i, 50 + (i % 10) as i32 * 50, 50 + (i / 10) as i32 * 50, 1, 0, i as i64))
            .collect();
        let set = seeded(spread).select_annotation_set(
            0,
            locator.max_markers,
            locator.min_marker_separation_px,
            &t,
        );
        assert_eq!(set.len(), locator.max_markers);
        assert_eq!(set[0].entry.index, 0);
    }

    #[test]
    fn annotation_set_ranks_by_score_then_recency() {
        let t = transformer(&[(1000, 1000, 1.0)]);
        let store = seeded(vec![
            entry(0, 100, 100, 1, 0, 0),   // newest
            entry(1, 300, 100, 5, 0, 50),  // score 5
            entry(2, 500, 100, 1, 3, 40),  // score 7
            entry(3, 700, 100, 5, 0, 10),  // score 5, more recent than #1
        ]);
        let order: Vec<u64> = store
            .select_annotation_set(0, 10, 20.0, &t)
            .iter()
            .map(|c| c.entry.index)
            .collect();
        assert_eq!(order, [0, 2, 3, 1]);
    }

    #[test]
    fn annotation_set_rejects_crowded_points_in_device_pixels() {
        // 15 logical px apart is 30 device px at 2x.
        let t = transformer(&[(1000, 1000, 2.0)]);
        let store = seeded(vec![
            entry(0, 100, 100, 1, 0, 0),
            entry(1, 115, 100, 9, 0, 10),
            entry(2, 200, 100, 1, 0, 20),
        ]);
        let at_2x: Vec<u64> = store.select_annotation_set(0, 5, 25.0, &t).iter().map(|c| c.entry.index).collect();
        assert_eq!(at_2x, [0, 1, 2]);
        let strict: Vec<u64> = store.select_annotation_set(0, 5, 40.0, &t).iter().map(|c| c.entry.index).collect();
        assert_eq!(strict, [0, 2]);
    }

    #[test]
    fn annotation_set_ignores_other_displays() {
        let t = transformer(&[(1000, 1000, 1.0), (1000, 1000, 1.0)]);
        let mut other = entry(1, 100, 100, 1, 0, 0);
        other.display_index = 1;
        let store = seeded(vec![entry(0, 100, 100, 1, 0, 5), other]);
        let set = store.select_annotation_set(0, 5, 1.0, &t);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].entry.index, 0);
        assert!(store.select_annotation_set(0, 0, 1.0, &t).is_empty());
    }
}
