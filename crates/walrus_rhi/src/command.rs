//! # Resource Command Buffers
//!
//! Resource lifecycle requests are not executed when the API is called.
//! They are serialized into the submit frame and replayed by the render
//! side against the backend:
//!
//! ```text
//! pre buffer:   creates and updates  → replayed before the frame's draws
//! post buffer:  destroys             → replayed after the frame's draws
//! ```
//!
//! [`CommandBuffer`] is a plain typed byte stream. [`ResourceCommand`] owns
//! the opcodes and the payload layout of each command.

use std::mem::align_of;

use bytemuck::Pod;

use crate::cursor::{align_up, ByteReader};
use crate::handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ShaderHandle, TextureHandle, UniformHandle,
    VertexLayoutHandle,
};
use crate::types::{
    Attachment, BackbufferRatio, BufferFlags, ShaderType, TextureCreateInfo, TextureFlags,
    TextureFormat, UniformType,
};
use crate::vertex_layout::VertexLayout;

/// Allocation granularity.
const BLOCK_SIZE: usize = 1024;

/// Minimum growth step.
const GROW_SIZE: usize = 16 << 10;

/// Growable byte stream with an alignment-aware write cursor.
///
/// Writes are only legal between [`start`](Self::start) and
/// [`finish`](Self::finish). After `finish` the committed bytes are read
/// back through [`reader`](Self::reader).
#[derive(Debug)]
pub struct CommandBuffer {
    data: Vec<u8>,
    pos: usize,
    size: usize,
    min_capacity: usize,
}

impl CommandBuffer {
    /// Creates a buffer of at least `min_capacity` bytes, rounded up to
    /// whole kilobytes.
    #[must_use]
    pub fn new(min_capacity: usize) -> Self {
        let min_capacity = align_up(min_capacity.max(1), BLOCK_SIZE);
        Self {
            data: vec![0; min_capacity],
            pos: 0,
            size: 0,
            min_capacity,
        }
    }

    /// Opens the buffer for writing and drops any committed bytes.
    pub fn start(&mut self) {
        self.pos = 0;
        self.size = 0;
    }

    /// Rewinds the cursor without touching the committed size.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Appends the end marker and commits the written bytes. Finishing
    /// again before [`start`](Self::start) keeps the committed bytes.
    pub fn finish(&mut self) {
        if !self.writable() {
            return;
        }
        self.write(Opcode::End as u8);
        self.size = self.pos;
        self.pos = 0;

        if self.size < self.min_capacity && self.data.len() > self.min_capacity {
            self.data.truncate(self.min_capacity);
            self.data.shrink_to_fit();
        }
    }

    /// Committed size in bytes, 0 while open.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns true if nothing is committed.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current write position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Allocated bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Appends `value` aligned to its natural alignment.
    pub fn write<T: Pod>(&mut self, value: T) {
        if !self.writable() {
            return;
        }
        self.align(align_of::<T>());
        self.put(bytemuck::bytes_of(&value));
    }

    /// Appends a `u32` length followed by `bytes`.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if !self.writable() {
            return;
        }
        self.write(bytes.len() as u32);
        self.put(bytes);
    }

    /// Appends a length-prefixed string.
    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Reader over the committed bytes.
    #[must_use]
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.data[..self.size])
    }

    /// Decodes the committed commands in order, stopping at the end marker.
    #[must_use]
    pub fn commands(&self) -> CommandIter<'_> {
        CommandIter { reader: self.reader(), done: false }
    }

    fn writable(&self) -> bool {
        debug_assert!(self.size == 0, "CommandBuffer written after finish without start");
        if self.size != 0 {
            tracing::error!("command buffer written after finish, write dropped");
            return false;
        }
        true
    }

    fn align(&mut self, align: usize) {
        let aligned = align_up(self.pos, align);
        self.reserve(aligned);
        self.data[self.pos..aligned].fill(0);
        self.pos = aligned;
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.reserve(end);
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    fn reserve(&mut self, end: usize) {
        if end > self.data.len() {
            let grown = align_up(end.max(self.data.len() + GROW_SIZE), BLOCK_SIZE);
            self.data.resize(grown, 0);
        }
    }
}

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    End = 0,
    CreateShader,
    CreateProgram,
    CreateUniform,
    ResizeUniform,
    CreateVertexLayout,
    CreateBuffer,
    UpdateBuffer,
    CreateTexture,
    ResizeTexture,
    CreateFramebuffer,
    DestroyShader,
    DestroyProgram,
    DestroyUniform,
    DestroyVertexLayout,
    DestroyBuffer,
    DestroyTexture,
    DestroyFramebuffer,
}

impl Opcode {
    const ALL: [Self; 18] = [
        Self::End,
        Self::CreateShader,
        Self::CreateProgram,
        Self::CreateUniform,
        Self::ResizeUniform,
        Self::CreateVertexLayout,
        Self::CreateBuffer,
        Self::UpdateBuffer,
        Self::CreateTexture,
        Self::ResizeTexture,
        Self::CreateFramebuffer,
        Self::DestroyShader,
        Self::DestroyProgram,
        Self::DestroyUniform,
        Self::DestroyVertexLayout,
        Self::DestroyBuffer,
        Self::DestroyTexture,
        Self::DestroyFramebuffer,
    ];

    /// Decodes an opcode byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

/// One resource lifecycle request, borrowing its payload from the stream.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ResourceCommand<'a> {
    CreateShader {
        handle: ShaderHandle,
        shader_type: ShaderType,
        source: &'a str,
    },
    CreateProgram {
        handle: ProgramHandle,
        shaders: Vec<ShaderHandle>,
    },
    CreateUniform {
        handle: UniformHandle,
        uniform_type: UniformType,
        num: u16,
        name: &'a str,
    },
    ResizeUniform {
        handle: UniformHandle,
        num: u16,
    },
    CreateVertexLayout {
        handle: VertexLayoutHandle,
        layout: VertexLayout,
    },
    CreateBuffer {
        handle: BufferHandle,
        flags: BufferFlags,
        size: u32,
        data: Option<&'a [u8]>,
    },
    UpdateBuffer {
        handle: BufferHandle,
        offset: u32,
        data: &'a [u8],
    },
    CreateTexture {
        handle: TextureHandle,
        info: TextureCreateInfo,
        data: Option<&'a [u8]>,
    },
    ResizeTexture {
        handle: TextureHandle,
        width: u32,
        height: u32,
        depth: u32,
        num_mipmaps: u8,
        num_layers: u16,
    },
    CreateFramebuffer {
        handle: FramebufferHandle,
        attachments: Vec<Attachment>,
    },
    DestroyShader(ShaderHandle),
    DestroyProgram(ProgramHandle),
    DestroyUniform(UniformHandle),
    DestroyVertexLayout(VertexLayoutHandle),
    DestroyBuffer(BufferHandle),
    DestroyTexture(TextureHandle),
    DestroyFramebuffer(FramebufferHandle),
    End,
}

const NO_RATIO: u8 = u8::MAX;

impl<'a> ResourceCommand<'a> {
    /// Opcode of this command.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::CreateShader { .. } => Opcode::CreateShader,
            Self::CreateProgram { .. } => Opcode::CreateProgram,
            Self::CreateUniform { .. } => Opcode::CreateUniform,
            Self::ResizeUniform { .. } => Opcode::ResizeUniform,
            Self::CreateVertexLayout { .. } => Opcode::CreateVertexLayout,
            Self::CreateBuffer { .. } => Opcode::CreateBuffer,
            Self::UpdateBuffer { .. } => Opcode::UpdateBuffer,
            Self::CreateTexture { .. } => Opcode::CreateTexture,
            Self::ResizeTexture { .. } => Opcode::ResizeTexture,
            Self::CreateFramebuffer { .. } => Opcode::CreateFramebuffer,
            Self::DestroyShader(_) => Opcode::DestroyShader,
            Self::DestroyProgram(_) => Opcode::DestroyProgram,
            Self::DestroyUniform(_) => Opcode::DestroyUniform,
            Self::DestroyVertexLayout(_) => Opcode::DestroyVertexLayout,
            Self::DestroyBuffer(_) => Opcode::DestroyBuffer,
            Self::DestroyTexture(_) => Opcode::DestroyTexture,
            Self::DestroyFramebuffer(_) => Opcode::DestroyFramebuffer,
            Self::End => Opcode::End,
        }
    }

    /// Serializes the command.
    pub fn encode(&self, buf: &mut CommandBuffer) {
        buf.write(self.opcode() as u8);
        match self {
            Self::CreateShader { handle, shader_type, source } => {
                buf.write(*handle);
                buf.write(*shader_type as u8);
                buf.write_str(source);
            }
            Self::CreateProgram { handle, shaders } => {
                buf.write(*handle);
                buf.write(shaders.len() as u8);
                for shader in shaders {
                    buf.write(*shader);
                }
            }
            Self::CreateUniform { handle, uniform_type, num, name } => {
                buf.write(*handle);
                buf.write(*uniform_type as u8);
                buf.write(*num);
                buf.write_str(name);
            }
            Self::ResizeUniform { handle, num } => {
                buf.write(*handle);
                buf.write(*num);
            }
            Self::CreateVertexLayout { handle, layout } => {
                buf.write(*handle);
                buf.write(*layout);
            }
            Self::CreateBuffer { handle, flags, size, data } => {
                buf.write(*handle);
                buf.write(flags.bits());
                buf.write(*size);
                write_optional_bytes(buf, *data);
            }
            Self::UpdateBuffer { handle, offset, data } => {
                buf.write(*handle);
                buf.write(*offset);
                buf.write_bytes(data);
            }
            Self::CreateTexture { handle, info, data } => {
                buf.write(*handle);
                buf.write(info.width);
                buf.write(info.height);
                buf.write(info.depth);
                buf.write(info.num_layers);
                buf.write(info.num_mipmaps);
                buf.write(info.format as u8);
                buf.write(info.ratio.map_or(NO_RATIO, |r| r as u8));
                buf.write(u8::from(info.cube_map));
                buf.write(info.flags.bits());
                write_optional_bytes(buf, *data);
            }
            Self::ResizeTexture { handle, width, height, depth, num_mipmaps, num_layers } => {
                buf.write(*handle);
                buf.write(*width);
                buf.write(*height);
                buf.write(*depth);
                buf.write(*num_mipmaps);
                buf.write(*num_layers);
            }
            Self::CreateFramebuffer { handle, attachments } => {
                buf.write(*handle);
                buf.write(attachments.len() as u8);
                for attachment in attachments {
                    buf.write(*attachment);
                }
            }
            Self::DestroyShader(h) => buf.write(*h),
            Self::DestroyProgram(h) => buf.write(*h),
            Self::DestroyUniform(h) => buf.write(*h),
            Self::DestroyVertexLayout(h) => buf.write(*h),
            Self::DestroyBuffer(h) => buf.write(*h),
            Self::DestroyTexture(h) => buf.write(*h),
            Self::DestroyFramebuffer(h) => buf.write(*h),
            Self::End => {}
        }
    }

    /// Deserializes the next command. Returns `None` on an unknown opcode,
    /// an invalid enum value or a truncated stream.
    pub fn decode(reader: &mut ByteReader<'a>) -> Option<Self> {
        let raw = reader.read::<u8>();
        if reader.is_overrun() {
            return None;
        }
        let Some(opcode) = Opcode::from_u8(raw) else {
            tracing::error!(opcode = raw, "unknown command opcode");
            return None;
        };

        let command = match opcode {
            Opcode::End => Self::End,
            Opcode::CreateShader => Self::CreateShader {
                handle: reader.read(),
                shader_type: ShaderType::from_u8(reader.read())?,
                source: reader.read_str()?,
            },
            Opcode::CreateProgram => {
                let handle = reader.read();
                let num = reader.read::<u8>();
                let shaders = (0..num).map(|_| reader.read()).collect();
                Self::CreateProgram { handle, shaders }
            }
            Opcode::CreateUniform => Self::CreateUniform {
                handle: reader.read(),
                uniform_type: UniformType::from_u8(reader.read())?,
                num: reader.read(),
                name: reader.read_str()?,
            },
            Opcode::ResizeUniform => Self::ResizeUniform {
                handle: reader.read(),
                num: reader.read(),
            },
            Opcode::CreateVertexLayout => Self::CreateVertexLayout {
                handle: reader.read(),
                layout: reader.read(),
            },
            Opcode::CreateBuffer => Self::CreateBuffer {
                handle: reader.read(),
                flags: BufferFlags::from_bits_retain(reader.read()),
                size: reader.read(),
                data: read_optional_bytes(reader),
            },
            Opcode::UpdateBuffer => Self::UpdateBuffer {
                handle: reader.read(),
                offset: reader.read(),
                data: reader.read_bytes(),
            },
            Opcode::CreateTexture => {
                let handle = reader.read();
                let width = reader.read();
                let height = reader.read();
                let depth = reader.read();
                let num_layers = reader.read();
                let num_mipmaps = reader.read();
                let format = TextureFormat::from_u8(reader.read())?;
                let ratio = match reader.read::<u8>() {
                    NO_RATIO => None,
                    r => Some(BackbufferRatio::from_u8(r)?),
                };
                let cube_map = reader.read::<u8>() != 0;
                let flags = TextureFlags::from_bits_retain(reader.read());
                let info = TextureCreateInfo {
                    width,
                    height,
                    depth,
                    num_layers,
                    num_mipmaps,
                    format,
                    flags,
                    ratio,
                    cube_map,
                };
                Self::CreateTexture { handle, info, data: read_optional_bytes(reader) }
            }
            Opcode::ResizeTexture => Self::ResizeTexture {
                handle: reader.read(),
                width: reader.read(),
                height: reader.read(),
                depth: reader.read(),
                num_mipmaps: reader.read(),
                num_layers: reader.read(),
            },
            Opcode::CreateFramebuffer => {
                let handle = reader.read();
                let num = reader.read::<u8>();
                let attachments = (0..num).map(|_| reader.read()).collect();
                Self::CreateFramebuffer { handle, attachments }
            }
            Opcode::DestroyShader => Self::DestroyShader(reader.read()),
            Opcode::DestroyProgram => Self::DestroyProgram(reader.read()),
            Opcode::DestroyUniform => Self::DestroyUniform(reader.read()),
            Opcode::DestroyVertexLayout => Self::DestroyVertexLayout(reader.read()),
            Opcode::DestroyBuffer => Self::DestroyBuffer(reader.read()),
            Opcode::DestroyTexture => Self::DestroyTexture(reader.read()),
            Opcode::DestroyFramebuffer => Self::DestroyFramebuffer(reader.read()),
        };

        if reader.is_overrun() {
            return None;
        }
        Some(command)
    }
}

fn write_optional_bytes(buf: &mut CommandBuffer, data: Option<&[u8]>) {
    match data {
        Some(bytes) => {
            buf.write(1u8);
            buf.write_bytes(bytes);
        }
        None => buf.write(0u8),
    }
}

fn read_optional_bytes<'a>(reader: &mut ByteReader<'a>) -> Option<&'a [u8]> {
    if reader.read::<u8>() == 0 {
        None
    } else {
        Some(reader.read_bytes())
    }
}

/// Iterator returned by [`CommandBuffer::commands`].
///
/// Yields commands until the end marker. A corrupt stream ends iteration
/// early after logging.
#[derive(Debug)]
pub struct CommandIter<'a> {
    reader: ByteReader<'a>,
    done: bool,
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = ResourceCommand<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match ResourceCommand::decode(&mut self.reader) {
            Some(ResourceCommand::End) | None => {
                self.done = true;
                None
            }
            Some(command) => Some(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex_layout::AttribType;

    #[test]
    fn test_capacity_rounds_to_block() {
        let buf = CommandBuffer::new(1500);
        assert_eq!(buf.capacity(), 2048);
    }

    #[test]
    fn test_typed_round_trip() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        buf.write(3u8);
        buf.write(0xdead_beef_u32);
        buf.write(1u16);
        buf.write(-2.5f32);
        buf.write(u64::MAX - 1);
        buf.write_bytes(b"walrus");
        buf.finish();

        let mut reader = buf.reader();
        assert_eq!(reader.read::<u8>(), 3);
        assert_eq!(reader.read::<u32>(), 0xdead_beef);
        assert_eq!(reader.read::<u16>(), 1);
        assert_eq!(reader.read::<f32>().to_bits(), (-2.5f32).to_bits());
        assert_eq!(reader.read::<u64>(), u64::MAX - 1);
        assert_eq!(reader.read_bytes(), b"walrus");
        assert_eq!(reader.read::<u8>(), Opcode::End as u8);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "written after finish")]
    fn test_double_finish_asserts() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        buf.finish();
        buf.finish();
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_double_finish_keeps_committed_bytes() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        buf.write(7u32);
        buf.finish();
        let committed = buf.len();
        buf.finish();
        assert_eq!(buf.len(), committed);
        assert_eq!(buf.reader().read::<u32>(), 7);
    }

    #[test]
    fn test_values_are_aligned() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        buf.write(1u8);
        buf.write(2u64);
        assert_eq!(buf.position(), 16);
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut buf = CommandBuffer::new(1024);
        buf.start();
        let payload = vec![0xabu8; 40_000];
        buf.write_bytes(&payload);
        assert!(buf.capacity() >= 40_004);
        assert_eq!(buf.capacity() % BLOCK_SIZE, 0);
        buf.finish();
        assert_eq!(buf.reader().read_bytes().len(), 40_000);
    }

    #[test]
    fn test_shrinks_after_small_frame() {
        let mut buf = CommandBuffer::new(1024);
        buf.start();
        buf.write_bytes(&vec![0u8; 20_000]);
        buf.finish();
        assert!(buf.capacity() > 1024);

        buf.start();
        buf.write(1u32);
        buf.finish();
        assert_eq!(buf.capacity(), 1024);
    }

    #[test]
    fn test_commands_stop_at_end() {
        let layout = VertexLayout::begin().add(2, AttribType::Float, false).end();
        let mut buf = CommandBuffer::new(256);
        buf.start();
        let commands = vec![
            ResourceCommand::CreateShader {
                handle: ShaderHandle(1),
                shader_type: ShaderType::Fragment,
                source: "void main() {}",
            },
            ResourceCommand::CreateProgram {
                handle: ProgramHandle(0),
                shaders: vec![ShaderHandle(0), ShaderHandle(1)],
            },
            ResourceCommand::CreateVertexLayout { handle: VertexLayoutHandle(2), layout },
            ResourceCommand::CreateBuffer {
                handle: BufferHandle(5),
                flags: BufferFlags::INDEX,
                size: 6,
                data: Some(&[1, 2, 3, 4, 5, 6]),
            },
            ResourceCommand::CreateTexture {
                handle: TextureHandle(9),
                info: TextureCreateInfo::with_ratio(BackbufferRatio::Half, TextureFormat::Rgba16F),
                data: None,
            },
            ResourceCommand::CreateFramebuffer {
                handle: FramebufferHandle(0),
                attachments: vec![Attachment::new(TextureHandle(9))],
            },
        ];
        for command in &commands {
            command.encode(&mut buf);
        }
        buf.finish();

        let decoded: Vec<_> = buf.commands().collect();
        assert_eq!(decoded, commands);
    }

    #[test]
    fn test_unknown_opcode_stops_replay() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        ResourceCommand::DestroyBuffer(BufferHandle(3)).encode(&mut buf);
        buf.write(200u8);
        ResourceCommand::DestroyBuffer(BufferHandle(4)).encode(&mut buf);
        buf.finish();

        let decoded: Vec<_> = buf.commands().collect();
        assert_eq!(decoded, vec![ResourceCommand::DestroyBuffer(BufferHandle(3))]);
    }

    #[test]
    fn test_restart_discards_previous_frame() {
        let mut buf = CommandBuffer::new(64);
        buf.start();
        ResourceCommand::DestroyShader(ShaderHandle(1)).encode(&mut buf);
        buf.finish();
        buf.start();
        buf.finish();
        assert_eq!(buf.commands().count(), 0);
    }
}
