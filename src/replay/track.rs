//! Replay position math over a fetched track
//!
//! A replay position is a percentage, 0 at the oldest sample and 100 at
//! the newest. Mapping percent to sample index is floor-based and clamped,
//! so equal inputs always land on the same sample and advancing the
//! percent never moves the index backwards.

use crate::state::TrackSample;

/// An aircraft's history, oldest sample first
#[derive(Debug, Clone, Default)]
pub struct ReplayTrack {
    samples: Vec<TrackSample>,
}

impl ReplayTrack {
    /// Build from samples as the query API delivers them, newest first
    pub fn from_newest_first(mut samples: Vec<TrackSample>) -> Self {
        samples.reverse();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    /// Sample index for a replay position; `None` only when the track is
    /// empty
    pub fn index_for(&self, position_pct: f64) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let clamped = position_pct.clamp(0.0, 100.0);
        let last = self.samples.len() - 1;
        Some(((clamped / 100.0 * last as f64).floor() as usize).min(last))
    }

    pub fn sample_at(&self, position_pct: f64) -> Option<&TrackSample> {
        self.index_for(position_pct).map(|i| &self.samples[i])
    }

    /// Everything flown so far: samples from the start through the current
    /// position, for drawing the trail behind the replayed aircraft
    pub fn visible_slice(&self, position_pct: f64) -> &[TrackSample] {
        match self.index_for(position_pct) {
            Some(index) => &self.samples[..=index],
            None => &[],
        }
    }

    /// Continuous point for smooth rendering between samples
    pub fn point_at(&self, position_pct: f64) -> Option<ReplayPoint> {
        if self.samples.is_empty() {
            return None;
        }
        let last = self.samples.len() - 1;
        let exact = position_pct.clamp(0.0, 100.0) / 100.0 * last as f64;
        let lower = exact.floor() as usize;
        let upper = (lower + 1).min(last);
        let frac = exact - lower as f64;

        let a = &self.samples[lower];
        let b = &self.samples[upper];
        Some(ReplayPoint {
            lat: lerp(a.lat, b.lat, frac),
            lon: lerp(a.lon, b.lon, frac),
            alt: lerp_opt(a.alt, b.alt, frac),
            gs: lerp_opt(a.gs, b.gs, frac),
            track: match (a.track, b.track) {
                (Some(from), Some(to)) => Some(lerp_angle(from, to, frac)),
                (only, None) | (None, only) => only,
            },
            ts: lerp(a.ts as f64, b.ts as f64, frac) as i64,
        })
    }
}

/// Interpolated state between two track samples
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub gs: Option<f64>,
    pub track: Option<f64>,
    pub ts: i64,
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_opt(a: Option<f64>, b: Option<f64>, t: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(lerp(a, b, t)),
        (only, None) | (None, only) => only,
    }
}

/// Angle interpolation along the shorter arc, result in [0, 360)
fn lerp_angle(from: f64, to: f64, t: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    (from + delta * t).rem_euclid(360.0)
}

/// Zoom and pan state for the altitude/speed graph under the replay view
///
/// The window is a slice of the 0..100 position axis: `100 / zoom` percent
/// wide, clamped so it never extends past either end.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphWindow {
    zoom: f64,
    offset: f64,
}

impl Default for GraphWindow {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset: 0.0,
        }
    }
}

impl GraphWindow {
    pub const MIN_ZOOM: f64 = 1.0;
    pub const MAX_ZOOM: f64 = 8.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Window width in percent of the full track
    pub fn width(&self) -> f64 {
        100.0 / self.zoom
    }

    /// Left and right edge positions
    pub fn range(&self) -> (f64, f64) {
        (self.offset, self.offset + self.width())
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        self.clamp_offset();
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * 2.0);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / 2.0);
    }

    /// Shift the window left or right by a percentage of the full track
    pub fn pan(&mut self, delta_pct: f64) {
        self.offset += delta_pct;
        self.clamp_offset();
    }

    /// Keep a position centered, e.g. following the playhead while zoomed
    pub fn center_on(&mut self, position_pct: f64) {
        self.offset = position_pct - self.width() / 2.0;
        self.clamp_offset();
    }

    fn clamp_offset(&mut self) {
        self.offset = self.offset.clamp(0.0, 100.0 - self.width());
    }

    /// Half-open sample index range covered by the window
    pub fn sample_range(&self, len: usize) -> std::ops::Range<usize> {
        if len == 0 {
            return 0..0;
        }
        let last = (len - 1) as f64;
        let (left, right) = self.range();
        let lower = (left / 100.0 * last).floor() as usize;
        let upper = ((right / 100.0 * last).ceil() as usize).min(len - 1);
        lower..upper + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(n: usize) -> ReplayTrack {
        // newest-first input, as the track query returns it
        let samples = (0..n)
            .rev()
            .map(|i| TrackSample {
                lat: i as f64,
                lon: -(i as f64),
                alt: Some(1000.0 * i as f64),
                gs: Some(100.0 + i as f64),
                vr: None,
                track: Some(10.0 * i as f64),
                ts: 1_700_000_000_000 + i as i64 * 1_000,
            })
            .collect();
        ReplayTrack::from_newest_first(samples)
    }

    #[test]
    fn test_samples_oldest_first_after_build() {
        let track = track(5);
        assert!(track.samples().windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn test_index_endpoints_and_clamp() {
        let track = track(11);
        assert_eq!(track.index_for(0.0), Some(0));
        assert_eq!(track.index_for(100.0), Some(10));
        assert_eq!(track.index_for(-20.0), Some(0));
        assert_eq!(track.index_for(250.0), Some(10));
        assert!(ReplayTrack::default().index_for(50.0).is_none());
    }

    #[test]
    fn test_index_is_monotonic() {
        let track = track(7);
        let mut previous = 0;
        for step in 0..=1000 {
            let index = track.index_for(step as f64 / 10.0).unwrap();
            assert!(index >= previous);
            previous = index;
        }
    }

    #[test]
    fn test_halfway_lands_on_middle_sample() {
        let track = track(3);
        let middle = track.sample_at(50.0).unwrap();
        assert_eq!(middle.ts, 1_700_000_000_000 + 1_000);
    }

    #[test]
    fn test_single_sample_track() {
        let track = track(1);
        assert_eq!(track.index_for(0.0), Some(0));
        assert_eq!(track.index_for(100.0), Some(0));
        assert_eq!(track.visible_slice(50.0).len(), 1);
    }

    #[test]
    fn test_visible_slice_grows_with_position() {
        let track = track(11);
        assert_eq!(track.visible_slice(0.0).len(), 1);
        assert_eq!(track.visible_slice(50.0).len(), 6);
        assert_eq!(track.visible_slice(100.0).len(), 11);
    }

    #[test]
    fn test_point_interpolates_between_samples() {
        let track = track(3);
        let point = track.point_at(25.0).unwrap();
        assert!((point.lat - 0.5).abs() < 1e-9);
        assert!((point.alt.unwrap() - 500.0).abs() < 1e-9);

        let end = track.point_at(100.0).unwrap();
        assert_eq!(end.lat, 2.0);
    }

    #[test]
    fn test_heading_interpolation_takes_short_arc() {
        assert!((lerp_angle(350.0, 10.0, 0.5) - 0.0).abs() < 1e-9);
        assert!((lerp_angle(10.0, 350.0, 0.5) - 0.0).abs() < 1e-9);
        assert!((lerp_angle(90.0, 180.0, 0.5) - 135.0).abs() < 1e-9);
        assert!((lerp_angle(270.0, 90.0, 1.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_heading_crosses_north() {
        let newer = TrackSample {
            lat: 1.0,
            lon: 1.0,
            alt: None,
            gs: None,
            vr: None,
            track: Some(10.0),
            ts: 2_000,
        };
        let older = TrackSample {
            lat: 0.0,
            lon: 0.0,
            track: Some(350.0),
            ts: 1_000,
            ..newer.clone()
        };
        let track = ReplayTrack::from_newest_first(vec![newer, older]);
        let midpoint = track.point_at(50.0).unwrap();
        assert!((midpoint.track.unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_zoom_clamped() {
        let mut window = GraphWindow::new();
        window.set_zoom(32.0);
        assert_eq!(window.zoom(), GraphWindow::MAX_ZOOM);
        window.set_zoom(0.1);
        assert_eq!(window.zoom(), GraphWindow::MIN_ZOOM);
    }

    #[test]
    fn test_pan_stays_in_bounds() {
        let mut window = GraphWindow::new();
        window.set_zoom(4.0);
        window.pan(200.0);
        assert_eq!(window.range(), (75.0, 100.0));
        window.pan(-500.0);
        assert_eq!(window.range(), (0.0, 25.0));
    }

    #[test]
    fn test_zoom_out_pulls_offset_back() {
        let mut window = GraphWindow::new();
        window.set_zoom(8.0);
        window.pan(100.0);
        assert_eq!(window.range(), (87.5, 100.0));

        window.zoom_out();
        // wider window no longer fits at the old offset
        assert_eq!(window.range(), (75.0, 100.0));

        window.set_zoom(1.0);
        assert_eq!(window.range(), (0.0, 100.0));
    }

    #[test]
    fn test_center_on_playhead() {
        let mut window = GraphWindow::new();
        window.set_zoom(4.0);
        window.center_on(50.0);
        assert_eq!(window.range(), (37.5, 62.5));
        window.center_on(2.0);
        assert_eq!(window.range(), (0.0, 25.0));
    }

    #[test]
    fn test_sample_range_full_and_zoomed() {
        let window = GraphWindow::new();
        assert_eq!(window.sample_range(11), 0..11);
        assert_eq!(window.sample_range(0), 0..0);

        let mut zoomed = GraphWindow::new();
        zoomed.set_zoom(2.0);
        zoomed.pan(50.0);
        assert_eq!(zoomed.sample_range(11), 5..11);
    }
}
