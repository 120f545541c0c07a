//! Ace Combat PMD model container.
//!
//! Little-endian throughout. The header addresses each sub-table by absolute
//! byte offset: bone name table, bone matrix table and the mesh section. Mesh
//! geometry is stored as variable-stride triangle strips.

use std::io::{Cursor, SeekFrom};

use anyhow::{ensure, Context, Result};
use binrw::{binread, BinReaderExt};
use glam::{Mat4, Vec2, Vec3};
use zerocopy::{FromBytes, FromZeroes, LittleEndian, U16, U32};

use crate::{array_ref, format::decode_fixed_name};

pub const K_PMD_SIGNATURE: [u8; 4] = *b"PMD.";

/// Sentinel magic of a geometry block in the mesh section. Any other value
/// marks the end of the section.
pub const K_MESH_BLOCK_MAGIC: u32 = 931;

// Section offset table slots used by this decoder
const K_SECTION_BONE_NAMES: usize = 0;
const K_SECTION_BONE_MATRICES: usize = 1;
const K_SECTION_MESH: usize = 3;

#[binread]
#[br(little, magic = b"PMD.")]
#[derive(Clone, Debug)]
pub struct PmdHeader {
    #[br(seek_before = SeekFrom::Start(9))]
    pub bone_count: u16,
    /// Absolute byte offsets: 0 = bone names, 1 = bone matrices, 3 = mesh
    /// section, remaining slots reserved.
    #[br(seek_before = SeekFrom::Start(32))]
    pub section_offsets: [i32; 8],
}

#[binread]
#[br(little)]
#[derive(Clone, Debug)]
struct BoneNameEntry {
    parent: i8,
    name: [u8; 11],
}

#[binread]
#[br(little)]
#[derive(Clone, Debug)]
struct BoneMatrixEntry {
    bind: [f32; 16],
    // Per-bone shadow matrix, unused by this decoder
    #[br(temp)]
    shadow: [f32; 16],
}

#[derive(Clone, Debug, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct MeshBlockHeader {
    pub magic: U32<LittleEndian>,
    pub header_size: U32<LittleEndian>,
    pub block_size: U32<LittleEndian>,
    pub unk_c: U16<LittleEndian>,
    pub unk_e: U16<LittleEndian>,
    pub unk_10: U16<LittleEndian>,
    pub unk_12: u8,
    pub unk_13: u8,
}

#[derive(Clone, Debug)]
pub struct Bone {
    /// Position in the bone table.
    pub index: usize,
    pub name: String,
    /// Raw parent index as stored; -1 or out-of-range means no parent.
    pub parent: i8,
    /// Bind-pose transform (stored row-major in the file).
    pub bind_matrix: Mat4,
}

impl Bone {
    /// Bind-pose head position (the matrix translation).
    pub fn head(&self) -> Vec3 { self.bind_matrix.w_axis.truncate() }
}

#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vec3>,
    /// One UV per vertex, V already flipped to `1 - v`.
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

#[derive(Clone, Debug)]
pub struct PmdModel {
    pub bones: Vec<Bone>,
    pub meshes: Vec<MeshData>,
}

impl PmdModel {
    pub fn slice(data: &[u8]) -> Result<PmdModel> {
        ensure!(
            data.len() >= 4 && data[0..4] == K_PMD_SIGNATURE,
            "Not a PMD file (missing 'PMD.' signature)"
        );
        let header: PmdHeader = Cursor::new(data).read_le().context("Truncated PMD header")?;
        log::debug!(
            "PMD header: {} bones, sections {:?}",
            header.bone_count,
            header.section_offsets
        );
        let bones = decode_bones(data, &header).context("Corrupt PMD skeleton table")?;
        let meshes = decode_meshes(data, header.section_offsets[K_SECTION_MESH]);
        Ok(PmdModel { bones, meshes })
    }

    /// Resolves a bone's parent link. Tolerates forward references; -1 and
    /// out-of-range indices resolve to `None`.
    pub fn bone_parent(&self, index: usize) -> Option<usize> {
        let parent = self.bones.get(index)?.parent;
        let parent = usize::try_from(parent).ok()?;
        (parent < self.bones.len()).then_some(parent)
    }
}

/// Placement fixup reconciling the source engine's axis convention with a
/// Z-up consumer: 90° about X, then 90° about Z. Left-multiply onto every
/// top-level mesh and skeleton-root transform.
pub fn scene_transform() -> Mat4 {
    Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2)
        * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2)
}

fn decode_bones(data: &[u8], header: &PmdHeader) -> Result<Vec<Bone>> {
    let mut reader = Cursor::new(data);
    // Out-of-range offsets are legal until a record read is attempted
    reader.set_position(header.section_offsets[K_SECTION_BONE_NAMES] as i64 as u64);
    let mut bones = Vec::with_capacity(header.bone_count as usize);
    for index in 0..header.bone_count as usize {
        let entry: BoneNameEntry = reader.read_le()?;
        let name = decode_fixed_name(&entry.name);
        let name = if name.is_empty() { format!("bone_{index}") } else { name };
        bones.push(Bone { index, name, parent: entry.parent, bind_matrix: Mat4::IDENTITY });
    }
    reader.set_position(header.section_offsets[K_SECTION_BONE_MATRICES] as i64 as u64);
    for bone in &mut bones {
        let entry: BoneMatrixEntry = reader.read_le()?;
        bone.bind_matrix = Mat4::from_cols_array(&entry.bind).transpose();
    }
    Ok(bones)
}

/// Scans geometry blocks from the mesh section until end of buffer or a
/// non-geometry block. Truncation mid-scan is the normal terminator, not an
/// error; whatever decoded so far is returned.
fn decode_meshes(data: &[u8], mesh_offset: i32) -> Vec<MeshData> {
    let mut meshes = Vec::new();
    let Ok(mut pos) = usize::try_from(mesh_offset) else {
        return meshes;
    };
    while pos < data.len() {
        let block_start = pos;
        let Some(header) = MeshBlockHeader::ref_from_prefix(&data[pos..]) else {
            break;
        };
        if header.magic.get() != K_MESH_BLOCK_MAGIC {
            break;
        }
        let header_size = header.header_size.get() as usize;
        let block_size = header.block_size.get() as usize;
        pos += std::mem::size_of::<MeshBlockHeader>();

        if pos + 8 > data.len() {
            break;
        }
        let stride = data[pos + 7] as usize;
        pos += 8;
        // Reserved field
        pos += 4;

        // Strip directory: pairs of (vertex count, strip repeat count).
        // Best-effort; entries past the end of the buffer read as zero.
        let directory_len = header_size.saturating_sub(32) / 2;
        let mut directory = Vec::with_capacity(directory_len);
        for _ in 0..directory_len {
            let value = if pos + 2 <= data.len() {
                u16::from_le_bytes(*array_ref!(data, pos, 2))
            } else {
                0
            };
            pos += 2;
            directory.push(value);
        }
        log::debug!(
            "Mesh block at {block_start:#x}: stride {stride}, {directory_len} directory entries"
        );

        let mut mesh = MeshData { name: format!("mesh_{}", meshes.len()), ..Default::default() };
        for pair in directory.chunks(2) {
            let vertex_count = pair[0] as usize;
            let strip_count = pair.get(1).copied().unwrap_or(0) as usize;
            for _ in 0..strip_count {
                let end = pos + vertex_count * stride;
                let vbuf = &data[pos.min(data.len())..end.min(data.len())];
                pos = end;
                decode_strip(&mut mesh, vbuf, vertex_count, stride);
            }
        }
        meshes.push(mesh);

        // The declared block size is the authoritative advance, regardless of
        // how many bytes the strip directory consumed. A non-advancing seek
        // ends the scan.
        let Some(next) = block_start.checked_add(block_size) else {
            break;
        };
        if next <= block_start {
            break;
        }
        pos = next;
    }
    meshes
}

/// Appends one triangle strip's vertices and triangles to `mesh`. Fields that
/// fall outside the vertex record are silently defaulted.
fn decode_strip(mesh: &mut MeshData, vbuf: &[u8], vertex_count: usize, stride: usize) {
    let start = mesh.vertices.len() as u32;
    for vi in 0..vertex_count {
        let base = vi * stride;
        let uv = if base + 12 <= vbuf.len() { read_vec2(vbuf, base + 4) } else { Vec2::ZERO };
        let position =
            if base + 28 <= vbuf.len() { read_vec3(vbuf, base + 16) } else { Vec3::ZERO };
        mesh.uvs.push(Vec2::new(uv.x, 1.0 - uv.y));
        mesh.vertices.push(position);
    }
    // Zig-zag strip: alternate winding to keep front faces consistent
    for i in 0..vertex_count.saturating_sub(2) {
        let i = i as u32;
        let tri = if i % 2 == 0 {
            [start + i, start + i + 1, start + i + 2]
        } else {
            [start + i + 2, start + i + 1, start + i]
        };
        mesh.triangles.push(tri);
    }
}

#[inline]
fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(*array_ref!(buf, offset, 4))
}

#[inline]
fn read_vec2(buf: &[u8], offset: usize) -> Vec2 {
    Vec2::new(read_f32(buf, offset), read_f32(buf, offset + 4))
}

#[inline]
fn read_vec3(buf: &[u8], offset: usize) -> Vec3 {
    Vec3::new(read_f32(buf, offset), read_f32(buf, offset + 4), read_f32(buf, offset + 8))
}
