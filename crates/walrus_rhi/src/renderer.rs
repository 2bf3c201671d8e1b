//! # Frame Execution
//!
//! Render-side half of the RHI: replays a frame's resource commands against
//! a backend and runs the render thread in dual-threaded mode.
//!
//! ```text
//! pre commands ──▶ sort ──▶ backend.submit ──▶ post commands
//! ```

use std::thread::{self, JoinHandle};

use walrus_core::FrameConsumer;

use crate::backend::RendererBackend;
use crate::command::{CommandBuffer, ResourceCommand};
use crate::error::{RhiError, RhiResult};
use crate::frame::RenderFrame;

/// Replays `commands` against `backend`. Returns the number executed.
pub(crate) fn execute_commands(backend: &mut dyn RendererBackend, commands: &CommandBuffer) -> usize {
    let mut executed = 0;
    for command in commands.commands() {
        match command {
            ResourceCommand::CreateShader { handle, shader_type, source } => {
                backend.create_shader(handle, shader_type, source);
            }
            ResourceCommand::CreateProgram { handle, shaders } => {
                backend.create_program(handle, &shaders);
            }
            ResourceCommand::CreateUniform { handle, uniform_type, num, name } => {
                backend.create_uniform(handle, name, uniform_type, num);
            }
            ResourceCommand::ResizeUniform { handle, num } => backend.resize_uniform(handle, num),
            ResourceCommand::CreateVertexLayout { handle, layout } => {
                backend.create_vertex_layout(handle, &layout);
            }
            ResourceCommand::CreateBuffer { handle, flags, size, data } => {
                backend.create_buffer(handle, flags, size, data);
            }
            ResourceCommand::UpdateBuffer { handle, offset, data } => {
                backend.update_buffer(handle, offset, data);
            }
            ResourceCommand::CreateTexture { handle, info, data } => {
                backend.create_texture(handle, &info, data);
            }
            ResourceCommand::ResizeTexture { handle, width, height, depth, num_mipmaps, num_layers } => {
                backend.resize_texture(handle, width, height, depth, num_mipmaps, num_layers);
            }
            ResourceCommand::CreateFramebuffer { handle, attachments } => {
                backend.create_framebuffer(handle, &attachments);
            }
            ResourceCommand::DestroyShader(handle) => backend.destroy_shader(handle),
            ResourceCommand::DestroyProgram(handle) => backend.destroy_program(handle),
            ResourceCommand::DestroyUniform(handle) => backend.destroy_uniform(handle),
            ResourceCommand::DestroyVertexLayout(handle) => backend.destroy_vertex_layout(handle),
            ResourceCommand::DestroyBuffer(handle) => backend.destroy_buffer(handle),
            ResourceCommand::DestroyTexture(handle) => backend.destroy_texture(handle),
            ResourceCommand::DestroyFramebuffer(handle) => backend.destroy_framebuffer(handle),
            ResourceCommand::End => break,
        }
        executed += 1;
    }
    executed
}

/// Executes a sealed frame.
pub(crate) fn render_frame(backend: &mut dyn RendererBackend, frame: &mut RenderFrame) {
    let created = execute_commands(backend, &frame.pre);
    frame.sort();
    backend.submit(frame);
    let destroyed = execute_commands(backend, &frame.post);
    tracing::trace!(
        frame = frame.frame_number,
        items = frame.num_items(),
        pre = created,
        post = destroyed,
        "frame executed"
    );
}

/// The dedicated render thread of dual-threaded mode.
///
/// Owns the backend. Exits when the submit side drops its
/// [`walrus_core::FrameProducer`], then shuts the backend down.
#[derive(Debug)]
pub(crate) struct RenderThread {
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Moves `backend` onto a new thread consuming frames from `consumer`.
    pub(crate) fn spawn(
        backend: Box<dyn RendererBackend>,
        consumer: FrameConsumer<RenderFrame>,
    ) -> RhiResult<Self> {
        let handle = thread::Builder::new()
            .name("walrus-render".into())
            .spawn(move || Self::render_loop(backend, &consumer))
            .map_err(|e| RhiError::RenderThread(e.to_string()))?;
        Ok(Self { handle: Some(handle) })
    }

    fn render_loop(mut backend: Box<dyn RendererBackend>, consumer: &FrameConsumer<RenderFrame>) {
        tracing::info!("render thread started");
        while let Some(mut frame) = consumer.wait_submit() {
            render_frame(backend.as_mut(), &mut frame);
            if consumer.finish(frame).is_err() {
                break;
            }
        }
        backend.shutdown();
        tracing::info!("render thread stopped");
    }

    /// Waits for the thread to exit.
    pub(crate) fn join(&mut self) -> RhiResult<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RhiError::RenderThread("render thread panicked".into())),
            None => Ok(()),
        }
    }

    /// Leaves the thread running without waiting for it.
    pub(crate) fn detach(&mut self) {
        if self.handle.take().is_some() {
            tracing::warn!("render thread detached without joining");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::handle::{ResourceKind, ShaderHandle};
    use crate::types::ShaderType;

    #[test]
    fn test_commands_replayed_in_order() {
        let mut backend = HeadlessBackend::new();
        let journal = backend.journal();

        let mut buf = CommandBuffer::new(256);
        buf.start();
        ResourceCommand::CreateShader {
            handle: ShaderHandle(0),
            shader_type: ShaderType::Vertex,
            source: "void main() {}",
        }
        .encode(&mut buf);
        ResourceCommand::DestroyShader(ShaderHandle(0)).encode(&mut buf);
        buf.finish();

        assert_eq!(execute_commands(&mut backend, &buf), 2);
        let journal = journal.lock();
        assert_eq!(journal.created(ResourceKind::Shader), 1);
        assert_eq!(journal.destroyed(ResourceKind::Shader), 1);
        assert!(journal.violations.is_empty());
    }
}
