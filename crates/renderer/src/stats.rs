//! Per-frame statistics.

use std::time::Instant;

use ember_core::Timer;

/// Timings in milliseconds and draw counts of the last frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineStats {
    pub frametime: f32,
    pub triangle_count: u32,
    pub drawcall_count: u32,
    pub scene_update_time: f32,
    pub mesh_draw_time: f32,
}

impl EngineStats {
    /// Clears the draw counters before recording a frame.
    pub fn reset_counters(&mut self) {
        self.triangle_count = 0;
        self.drawcall_count = 0;
    }

    /// Counts one indexed draw of `index_count` indices.
    #[inline]
    pub fn record_draw(&mut self, index_count: u32) {
        self.drawcall_count += 1;
        self.triangle_count += index_count / 3;
    }

    pub fn finish_scene_update(&mut self, started: Instant) {
        self.scene_update_time = Timer::millis_since(started);
    }

    pub fn finish_mesh_draw(&mut self, started: Instant) {
        self.mesh_draw_time = Timer::millis_since(started);
    }

    pub fn set_frametime(&mut self, delta_secs: f32) {
        self.frametime = delta_secs * 1000.0;
    }

    /// Frames per second implied by the last frame time.
    pub fn fps(&self) -> f32 {
        if self.frametime > 0.0 {
            1000.0 / self.frametime
        } else {
            0.0
        }
    }
}
