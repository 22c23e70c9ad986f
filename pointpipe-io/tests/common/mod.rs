//! Helpers shared by the integration tests: a minimal writer for synthetic format 0
//! LAS files and a collector that drains a sequential iterator.

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};

use pointpipe_core::containers::PointBuffer;
use pointpipe_core::layout::DimensionKind;
use pointpipe_io::base::SequentialIterator;

const HEADER_SIZE: u16 = 227;
const RECORD_LENGTH: u16 = 20;

/// Writes a complete format 0 LAS file holding one point record per (x, y, z) triple
pub fn build_las(points: &[(i32, i32, i32)]) -> Vec<u8> {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(b"LASF");
    bytes.write_u16::<LittleEndian>(0).unwrap(); // file source id
    bytes.write_u16::<LittleEndian>(0).unwrap(); // reserved
    bytes.extend_from_slice(&[0u8; 16]); // project id
    bytes.push(1); // version major
    bytes.push(2); // version minor
    bytes.extend_from_slice(&[0u8; 64]); // system id + software id
    bytes.write_u16::<LittleEndian>(1).unwrap(); // creation day of year
    bytes.write_u16::<LittleEndian>(2026).unwrap(); // creation year
    bytes.write_u16::<LittleEndian>(HEADER_SIZE).unwrap();
    bytes.write_u32::<LittleEndian>(HEADER_SIZE as u32).unwrap(); // data offset
    bytes.write_u32::<LittleEndian>(0).unwrap(); // VLR count
    bytes.push(0); // point format, uncompressed
    bytes.write_u16::<LittleEndian>(RECORD_LENGTH).unwrap();
    bytes
        .write_u32::<LittleEndian>(points.len() as u32)
        .unwrap();
    for _ in 0..5 {
        bytes.write_u32::<LittleEndian>(0).unwrap(); // points by return
    }
    for _ in 0..6 {
        bytes.write_f64::<LittleEndian>(1.0).unwrap(); // scale + offset
    }
    for _ in 0..6 {
        bytes.write_f64::<LittleEndian>(0.0).unwrap(); // extents
    }
    assert_eq!(HEADER_SIZE as usize, bytes.len());

    for &(x, y, z) in points {
        bytes.write_i32::<LittleEndian>(x).unwrap();
        bytes.write_i32::<LittleEndian>(y).unwrap();
        bytes.write_i32::<LittleEndian>(z).unwrap();
        bytes.write_u16::<LittleEndian>(0).unwrap(); // intensity
        bytes.push(0b0000_1001); // flags: return 1 of 1
        bytes.push(0); // classification
        bytes.write_i8(0).unwrap(); // scan angle rank
        bytes.push(0); // user data
        bytes.write_u16::<LittleEndian>(0).unwrap(); // point source id
    }

    bytes
}

/// Drains the iterator through a buffer of the given capacity and returns all
/// (x, y, z) triples in the order they were yielded
pub fn collect_points(
    iterator: &mut dyn SequentialIterator,
    buffer: &mut PointBuffer,
) -> Result<Vec<(i32, i32, i32)>> {
    let (index_x, index_y, index_z) = {
        let schema = buffer.schema();
        (
            schema.index_of(DimensionKind::X)?,
            schema.index_of(DimensionKind::Y)?,
            schema.index_of(DimensionKind::Z)?,
        )
    };

    let mut points = Vec::new();
    loop {
        let read = iterator.read(buffer)?;
        if read == 0 {
            break;
        }
        for point in 0..read as usize {
            points.push((
                buffer.get_field(point, index_x)?,
                buffer.get_field(point, index_y)?,
                buffer.get_field(point, index_z)?,
            ));
        }
    }
    Ok(points)
}
