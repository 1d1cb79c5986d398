#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    /// Distance of the sentinel's top edge from the top of the content.
    pub sentinel_top: f64,
}

impl ViewportGeometry {
    /// How far below the visible area the sentinel still is. Zero or less
    /// means it is on screen.
    pub fn distance_to_sentinel(&self) -> f64 {
        self.sentinel_top - (self.scroll_offset + self.viewport_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentinelEntered {
    pub distance: f64,
}

/// The scroll surface the coordinator saves and restores.
pub trait Viewport: Send {
    fn scroll_offset(&self) -> f64;
    fn scroll_to(&mut self, offset: f64);
    fn geometry(&self) -> ViewportGeometry;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverState {
    Watching,
    Detached,
}

#[derive(Debug, Clone)]
pub struct SentinelObserver {
    margin: f64,
    state: ObserverState,
}

impl SentinelObserver {
    pub fn new(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
            state: ObserverState::Watching,
        }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn is_watching(&self) -> bool {
        self.state == ObserverState::Watching
    }

    pub fn observe(&mut self) {
        if self.state == ObserverState::Detached {
            log::trace!("Sentinel observer re-attached");
        }
        self.state = ObserverState::Watching;
    }

    pub fn unobserve(&mut self) {
        self.state = ObserverState::Detached;
    }

    /// Reports entry if watching and the sentinel is within range. Firing
    /// detaches the observer; it stays silent until [`observe`] is called.
    ///
    /// [`observe`]: SentinelObserver::observe
    pub fn evaluate(&mut self, geometry: ViewportGeometry) -> Option<SentinelEntered> {
        if !self.is_watching() {
            return None;
        }

        let distance = geometry.distance_to_sentinel();
        if distance > self.margin {
            log::trace!("Sentinel {:.0} away, outside margin {:.0}", distance, self.margin);
            return None;
        }

        self.unobserve();
        log::trace!("Sentinel entered range ({:.0} away)", distance);
        Some(SentinelEntered { distance })
    }
}
