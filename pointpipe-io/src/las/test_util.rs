//! Builder for synthetic in-memory LAS files, so the parsing tests do not depend on
//! fixture files on disk.

use byteorder::{LittleEndian, WriteBytesExt};

use pointpipe_core::layout::{format_has_colors, format_has_gps_time};
use pointpipe_core::nalgebra::Vector3;

use super::header::LAS_HEADER_SIZE;
use super::point_source::PointRecord;

pub(crate) struct TestVlr {
    record_id: u16,
    data: Vec<u8>,
}

/// Builds a complete LAS file as a byte vector, one field at a time, in the exact
/// on-disk layout. All fields have sensible defaults; tests override only what they
/// exercise.
pub(crate) struct TestLasFile {
    point_format: u8,
    version_minor: u8,
    compressed: bool,
    system_id: String,
    software_id: String,
    points: Vec<PointRecord>,
    declared_point_count: Option<u32>,
    vlrs: Vec<TestVlr>,
    pad_signature: Option<[u8; 2]>,
    extra_bytes_per_point: u16,
    scale: Vector3<f64>,
    offset: Vector3<f64>,
}

impl TestLasFile {
    pub(crate) fn new(point_format: u8) -> Self {
        Self {
            point_format,
            version_minor: 2,
            compressed: false,
            system_id: "pointpipe".into(),
            software_id: "pointpipe".into(),
            points: Vec::new(),
            declared_point_count: None,
            vlrs: Vec::new(),
            pad_signature: None,
            extra_bytes_per_point: 0,
            scale: Vector3::new(0.01, 0.01, 0.01),
            offset: Vector3::new(0.0, 0.0, 0.0),
        }
    }

    pub(crate) fn with_version_minor(mut self, version_minor: u8) -> Self {
        self.version_minor = version_minor;
        self
    }

    pub(crate) fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    pub(crate) fn with_system_id(mut self, system_id: &str) -> Self {
        self.system_id = system_id.into();
        self
    }

    pub(crate) fn with_software_id(mut self, software_id: &str) -> Self {
        self.software_id = software_id.into();
        self
    }

    pub(crate) fn with_points(mut self, points: Vec<PointRecord>) -> Self {
        self.points = points;
        self
    }

    /// Overrides the point count written to the header, regardless of how many
    /// points the file actually contains
    pub(crate) fn with_declared_point_count(mut self, count: u32) -> Self {
        self.declared_point_count = Some(count);
        self
    }

    pub(crate) fn with_vlr(mut self, record_id: u16, data: Vec<u8>) -> Self {
        self.vlrs.push(TestVlr { record_id, data });
        self
    }

    pub(crate) fn with_pad_signature(mut self) -> Self {
        self.pad_signature = Some([0xCC, 0xDD]);
        self
    }

    pub(crate) fn with_swapped_pad_signature(mut self) -> Self {
        self.pad_signature = Some([0xDD, 0xCC]);
        self
    }

    pub(crate) fn with_extra_bytes_per_point(mut self, extra: u16) -> Self {
        self.extra_bytes_per_point = extra;
        self
    }

    pub(crate) fn with_scale_and_offset(
        mut self,
        scale: Vector3<f64>,
        offset: Vector3<f64>,
    ) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub(crate) fn point_format(&self) -> u8 {
        self.point_format
    }

    pub(crate) fn record_length(&self) -> u16 {
        let mut length = 20u16;
        if format_has_gps_time(self.point_format) {
            length += 8;
        }
        if format_has_colors(self.point_format) {
            length += 6;
        }
        length + self.extra_bytes_per_point
    }

    /// Returns the data offset as written to the header, before any pad fixup. When a
    /// pad signature is requested it is written at this offset, so the effective
    /// offset is 2 bytes further.
    pub(crate) fn declared_data_offset(&self) -> u32 {
        let vlr_bytes: usize = self.vlrs.iter().map(|vlr| 54 + vlr.data.len()).sum();
        LAS_HEADER_SIZE as u32 + vlr_bytes as u32
    }

    /// Returns the effective offset to the first point record
    pub(crate) fn data_offset(&self) -> u64 {
        let mut offset = self.declared_data_offset() as u64;
        if self.pad_signature.is_some() {
            offset += 2;
        }
        offset
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(b"LASF");
        bytes.write_u16::<LittleEndian>(0).unwrap(); // file source id
        bytes.write_u16::<LittleEndian>(0).unwrap(); // reserved
        bytes.extend_from_slice(&[0u8; 16]); // project id
        bytes.push(1); // version major
        bytes.push(self.version_minor);
        write_fixed_string(&mut bytes, &self.system_id, 32);
        write_fixed_string(&mut bytes, &self.software_id, 32);
        bytes.write_u16::<LittleEndian>(1).unwrap(); // creation day of year
        bytes.write_u16::<LittleEndian>(2026).unwrap(); // creation year
        bytes.write_u16::<LittleEndian>(LAS_HEADER_SIZE).unwrap();
        bytes
            .write_u32::<LittleEndian>(self.declared_data_offset())
            .unwrap();
        bytes
            .write_u32::<LittleEndian>(self.vlrs.len() as u32)
            .unwrap();

        let mut format_byte = self.point_format;
        if self.compressed {
            format_byte |= 0x80;
        }
        bytes.push(format_byte);
        bytes.write_u16::<LittleEndian>(self.record_length()).unwrap();

        let point_count = self
            .declared_point_count
            .unwrap_or(self.points.len() as u32);
        bytes.write_u32::<LittleEndian>(point_count).unwrap();
        for _ in 0..5 {
            bytes.write_u32::<LittleEndian>(0).unwrap(); // points by return
        }

        for component in &[self.scale, self.offset] {
            bytes.write_f64::<LittleEndian>(component.x).unwrap();
            bytes.write_f64::<LittleEndian>(component.y).unwrap();
            bytes.write_f64::<LittleEndian>(component.z).unwrap();
        }

        // Extents, max before min per axis
        for &(max, min) in &[(1000.0, 0.0), (2000.0, 0.0), (3000.0, 0.0)] {
            bytes.write_f64::<LittleEndian>(max).unwrap();
            bytes.write_f64::<LittleEndian>(min).unwrap();
        }
        assert_eq!(LAS_HEADER_SIZE as usize, bytes.len());

        for vlr in &self.vlrs {
            bytes.write_u16::<LittleEndian>(0).unwrap(); // reserved
            write_fixed_string(&mut bytes, "pointpipe", 16);
            bytes.write_u16::<LittleEndian>(vlr.record_id).unwrap();
            bytes
                .write_u16::<LittleEndian>(vlr.data.len() as u16)
                .unwrap();
            write_fixed_string(&mut bytes, "test record", 32);
            bytes.extend_from_slice(&vlr.data);
        }

        if let Some(pad) = self.pad_signature {
            bytes.extend_from_slice(&pad);
        }

        for point in &self.points {
            self.write_point(&mut bytes, point);
        }

        bytes
    }

    fn write_point(&self, bytes: &mut Vec<u8>, point: &PointRecord) {
        bytes.write_i32::<LittleEndian>(point.x).unwrap();
        bytes.write_i32::<LittleEndian>(point.y).unwrap();
        bytes.write_i32::<LittleEndian>(point.z).unwrap();
        bytes.write_u16::<LittleEndian>(point.intensity).unwrap();

        let flags = (point.return_number & 0x07)
            | ((point.number_of_returns & 0x07) << 3)
            | ((point.scan_direction & 0x01) << 6)
            | ((point.edge_of_flight_line & 0x01) << 7);
        bytes.push(flags);

        bytes.push(point.classification);
        bytes.write_i8(point.scan_angle_rank).unwrap();
        bytes.push(point.user_data);
        bytes
            .write_u16::<LittleEndian>(point.point_source_id)
            .unwrap();

        if format_has_gps_time(self.point_format) {
            bytes
                .write_f64::<LittleEndian>(point.gps_time.unwrap_or(0.0))
                .unwrap();
        }
        if format_has_colors(self.point_format) {
            let color = point.color.unwrap_or_else(|| Vector3::new(0, 0, 0));
            bytes.write_u16::<LittleEndian>(color.x).unwrap();
            bytes.write_u16::<LittleEndian>(color.y).unwrap();
            bytes.write_u16::<LittleEndian>(color.z).unwrap();
        }

        bytes.extend(std::iter::repeat(0u8).take(self.extra_bytes_per_point as usize));
    }
}

fn write_fixed_string(bytes: &mut Vec<u8>, text: &str, length: usize) {
    let raw = text.as_bytes();
    assert!(raw.len() <= length);
    bytes.extend_from_slice(raw);
    bytes.extend(std::iter::repeat(0u8).take(length - raw.len()));
}

/// Produces `count` distinct points with predictable coordinates, so tests can tell
/// exactly which point ended up where
pub(crate) fn ramp_points(count: usize) -> Vec<PointRecord> {
    (0..count)
        .map(|index| {
            let mut point = PointRecord::default();
            point.x = index as i32 * 100;
            point.y = index as i32 * 100 + 1;
            point.z = index as i32 * 100 + 2;
            point.intensity = index as u16;
            point.return_number = 1;
            point.number_of_returns = 1;
            point.classification = 2;
            point.point_source_id = 7;
            point
        })
        .collect()
}
