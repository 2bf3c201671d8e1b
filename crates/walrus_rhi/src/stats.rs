//! Per-frame execution counters reported by backends.

/// What a backend did while executing one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Draw items executed.
    pub draw_calls: u32,
    /// Compute dispatches executed.
    pub compute_calls: u32,
    /// Vertices drawn, summed over draws.
    pub num_vertices: u64,
    /// Indices drawn, summed over draws.
    pub num_indices: u64,
    /// Instances drawn, summed over draws.
    pub num_instances: u64,
    /// Times execution moved to a new view.
    pub view_changes: u32,
    /// Times the bound program changed.
    pub program_changes: u32,
    /// Times the packed render or stencil state changed.
    pub state_changes: u32,
    /// Uniform value writes applied.
    pub uniform_updates: u32,
    /// Bytes uploaded from the transient vertex and index arenas.
    pub transient_bytes: u64,
}

impl RenderStats {
    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Counts one draw.
    pub fn record_draw(&mut self, vertices: u32, indices: u32, instances: u32) {
        self.draw_calls += 1;
        self.num_vertices += u64::from(vertices) * u64::from(instances.max(1));
        self.num_indices += u64::from(indices) * u64::from(instances.max(1));
        self.num_instances += u64::from(instances);
    }

    /// Emits the counters at trace level.
    pub fn trace(&self, frame: u64) {
        tracing::trace!(
            frame,
            draw_calls = self.draw_calls,
            compute_calls = self.compute_calls,
            vertices = self.num_vertices,
            indices = self.num_indices,
            instances = self.num_instances,
            view_changes = self.view_changes,
            program_changes = self.program_changes,
            state_changes = self.state_changes,
            "frame stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_draw_scales_by_instances() {
        let mut stats = RenderStats::default();
        stats.record_draw(3, 6, 4);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.num_vertices, 12);
        assert_eq!(stats.num_indices, 24);
        assert_eq!(stats.num_instances, 4);

        stats.reset();
        assert_eq!(stats, RenderStats::default());
    }
}
