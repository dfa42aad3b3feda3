//! The non-blocking side: a fixed-rate frame loop.
//!
//! Each frame reads the shared state, plays the sunset animation when the
//! window opens, and hands a snapshot to the [`Renderer`]. Nothing here
//! touches the network or persistent storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::clock::{Interval, SharedClock};
use crate::common::constants::ANIMATION_YIELD_INTERVAL_MS;
use crate::coordinator::{RenderHandle, SharedSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSnapshot {
    pub frame: u64,
    pub shared: SharedSnapshot,
}

/// Cooperative yield point for long animations.
pub trait Yield {
    fn yield_now(&mut self);
}

/// Display collaborator.
pub trait Renderer: Send {
    /// Draw one frame. Must return quickly.
    fn draw(&mut self, snapshot: &RenderSnapshot);

    /// Play the sunset sequence. Long sequences call `yielder.yield_now()` between steps.
    fn play_sunset(&mut self, yielder: &mut dyn Yield);
}

/// Yields the thread on every call and sleeps briefly once per interval.
pub struct ClockYield {
    clock: SharedClock,
    interval_ms: u64,
    last_ms: u64,
    yields: u64,
}

impl ClockYield {
    pub fn new(clock: SharedClock) -> Self {
        let last_ms = clock.now_ms();
        Self {
            clock,
            interval_ms: ANIMATION_YIELD_INTERVAL_MS,
            last_ms,
            yields: 0,
        }
    }

    pub fn yields(&self) -> u64 {
        self.yields
    }
}

impl Yield for ClockYield {
    fn yield_now(&mut self) {
        self.yields += 1;
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_ms) >= self.interval_ms {
            self.clock.sleep(Duration::from_millis(1));
            self.last_ms = self.clock.now_ms();
        } else {
            std::thread::yield_now();
        }
    }
}

pub struct RenderLoop {
    handle: RenderHandle,
    renderer: Box<dyn Renderer>,
    clock: SharedClock,
    frame_timer: Interval,
    frames: u64,
    sunsets_played: u32,
    running: Arc<AtomicBool>,
}

impl RenderLoop {
    pub fn new(
        handle: RenderHandle,
        renderer: Box<dyn Renderer>,
        clock: SharedClock,
        hz: u32,
        running: Arc<AtomicBool>,
    ) -> Self {
        let period = Duration::from_micros(1_000_000 / u64::from(hz.max(1)));
        let frame_timer = Interval::immediate(period, clock.now_ms());
        Self {
            handle,
            renderer,
            clock,
            frame_timer,
            frames: 0,
            sunsets_played: 0,
            running,
        }
    }

    /// Render one frame if it is due. Returns whether a frame was drawn.
    pub fn tick(&mut self) -> bool {
        if !self.frame_timer.poll(self.clock.now_ms()) {
            return false;
        }
        self.frames += 1;

        if self.handle.is_sunset_now() {
            log_block_start!("Sunset window open, playing animation");
            let mut yielder = ClockYield::new(self.clock.clone());
            self.renderer.play_sunset(&mut yielder);
            self.handle.acknowledge_played();
            self.sunsets_played += 1;
            log_decorated!("Sunset animation finished");
        }

        let snapshot = RenderSnapshot {
            frame: self.frames,
            shared: self.handle.snapshot(),
        };
        self.renderer.draw(&snapshot);
        true
    }

    /// Run frames until the running flag clears.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            if !self.tick() {
                let wait = self.frame_timer.remaining_ms(self.clock.now_ms()).max(1);
                self.clock.sleep(Duration::from_millis(wait));
            }
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn sunsets_played(&self) -> u32 {
        self.sunsets_played
    }
}

const CONSOLE_ANIMATION_STEPS: u32 = 120;

/// Host renderer: reports display-relevant changes as log lines.
#[derive(Default)]
pub struct ConsoleRenderer {
    last_healthy: Option<bool>,
    last_sunset_minute: Option<i32>,
    last_fetch_ms: Option<u64>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for ConsoleRenderer {
    fn draw(&mut self, snapshot: &RenderSnapshot) {
        let shared = &snapshot.shared;
        if self.last_healthy != Some(shared.network_healthy) {
            self.last_healthy = Some(shared.network_healthy);
            if shared.network_healthy {
                log_info!("Display: online");
            } else {
                log_info!("Display: offline indicator");
            }
        }
        if shared.sunset_minute.is_some() && self.last_sunset_minute != shared.sunset_minute {
            self.last_sunset_minute = shared.sunset_minute;
            if let Some(minute) = shared.sunset_minute {
                log_info!(
                    "Display: sunset scheduled for {:02}:{:02}",
                    minute / 60,
                    minute % 60
                );
            }
        }
        if shared.last_fetch_ms != self.last_fetch_ms {
            self.last_fetch_ms = shared.last_fetch_ms;
            log_debug!("Display: refreshed with new data (frame {})", snapshot.frame);
        }
    }

    fn play_sunset(&mut self, yielder: &mut dyn Yield) {
        for step in 0..CONSOLE_ANIMATION_STEPS {
            if step % 40 == 0 {
                log_indented!("Sunset animation {}%", step * 100 / CONSOLE_ANIMATION_STEPS);
            }
            yielder.yield_now();
        }
    }
}
