// Cached display topology in a single canonical frame.
//
// Platform sources report raw geometry in whatever frame the OS uses; this
// module normalizes it to top-left-origin, main-display-relative logical
// pixels and caches the result for a short TTL. Refreshes swap the whole
// `Arc<Topology>`, so readers never observe a partially rebuilt topology.
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::display::sources::TopologySource;
use crate::display::types::{Display, OriginFrame, RawDisplay, Topology};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

const FALLBACK_WIDTH: u32 = 1920;
const FALLBACK_HEIGHT: u32 = 1080;

struct CachedTopology {
    topology: Arc<Topology>,
    fetched_at: Instant,
}

pub struct DisplayTopology {
    /// Tried in order; the first non-empty answer wins.
    sources: Vec<Box<dyn TopologySource>>,
    ttl: Duration,
    cache: RwLock<Option<CachedTopology>>,
}

impl DisplayTopology {
    pub fn new(sources: Vec<Box<dyn TopologySource>>, ttl: Duration) -> Self {
        Self {
            sources,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Returns the cached topology, querying the platform when the TTL expired.
    pub async fn get(&self) -> Arc<Topology> {
        if let Some(topology) = self.cached() {
            return topology;
        }
        self.refresh().await
    }

    /// Queries the sources unconditionally and replaces the cache.
    pub async fn refresh(&self) -> Arc<Topology> {
        let raw = self.query_sources().await;
        let topology = Arc::new(normalize(raw));
        tracing::debug!(
            displays = topology.displays.len(),
            total_width = topology.total_width,
            total_height = topology.total_height,
            "display topology refreshed"
        );
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(CachedTopology {
                topology: topology.clone(),
                fetched_at: Instant::now(),
            });
        }
        topology
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    fn cached(&self) -> Option<Arc<Topology>> {
        let guard = self.cache.read().ok()?;
        let entry = guard.as_ref()?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.topology.clone())
    }

    async fn query_sources(&self) -> Vec<RawDisplay> {
        for source in &self.sources {
            match source.query().await {
                Ok(raw) if !raw.is_empty() => {
                    tracing::debug!(source = source.name(), count = raw.len(), "topology source answered");
                    return raw;
                }
                Ok(_) => {
                    tracing::warn!(source = source.name(), "topology source returned no displays");
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "topology source failed");
                }
            }
        }
        tracing::warn!("all topology sources failed; synthesizing a {FALLBACK_WIDTH}x{FALLBACK_HEIGHT} display");
        Vec::new()
    }
}

/// Normalizes raw platform geometry into the canonical frame.
///
/// Bottom-left origins are flipped with
/// `canonical_y = main_height - (device_y + height)`. The main display always
/// lands at (0, 0) and index 0; the remaining displays follow left to right.
pub fn normalize(raw: Vec<RawDisplay>) -> Topology {
    let mut raw: Vec<RawDisplay> = raw
        .into_iter()
        .filter(|d| {
            let usable = d.width > 0 && d.height > 0;
            if !usable {
                tracing::warn!(name = %d.name, "dropping zero-sized display");
            }
            usable
        })
        .collect();

    if raw.is_empty() {
        raw.push(RawDisplay {
            name: "Synthesized Display".into(),
            is_main: true,
            width: FALLBACK_WIDTH,
            height: FALLBACK_HEIGHT,
            origin_x: 0,
            origin_y: 0,
            scale_factor: 1.0,
            frame: OriginFrame::TopLeft,
        });
    }

    let main_pos = raw.iter().position(|d| d.is_main).unwrap_or(0);
    let main = raw.remove(main_pos);

    let to_canonical = |d: &RawDisplay| -> (i32, i32) {
        let x = d.origin_x - main.origin_x;
        let y = match d.frame {
            OriginFrame::BottomLeft => {
                main.height as i32 - (d.origin_y - main.origin_y + d.height as i32)
            }
            OriginFrame::TopLeft => d.origin_y - main.origin_y,
        };
        (x, y)
    };

    let mut others: Vec<(RawDisplay, i32, i32)> = raw
        .into_iter()
        .map(|d| {
            let (x, y) = to_canonical(&d);
            (d, x, y)
        })
        .collect();
    others.sort_by_key(|(_, x, y)| (*x, *y));

    let mut displays = Vec::with_capacity(others.len() + 1);
    displays.push(Display {
        index: 0,
        name: main.name.clone(),
        is_main: true,
        width: main.width,
        height: main.height,
        origin_x: 0,
        origin_y: 0,
        scale_factor: sanitize_scale(main.scale_factor),
    });
    for (d, x, y) in others {
        displays.push(Display {
            index: displays.len(),
            name: d.name,
            is_main: false,
            width: d.width,
            height: d.height,
            origin_x: x,
            origin_y: y,
            scale_factor: sanitize_scale(d.scale_factor),
        });
    }

    let min_x = displays.iter().map(|d| d.origin_x as i64).min().unwrap_or(0);
    let max_x = displays
        .iter()
        .map(|d| d.origin_x as i64 + d.width as i64)
        .max()
        .unwrap_or(0);
    let total_height = displays.iter().map(|d| d.height).max().unwrap_or(0);

    Topology {
        total_width: (max_x - min_x).max(0) as u32,
        total_height,
        main_display_index: 0,
        displays,
    }
}

fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale >= 1.0 {
        scale
    } else {
        1.0
    }
}
