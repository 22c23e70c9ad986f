use std::sync::Arc;

use crate::error::PipelineError;
use crate::layout::{Dimension, DimensionDataType, Schema};

/// Marker trait for all primitive types that can be stored in a point buffer field.
/// Each implementing type corresponds to exactly one [DimensionDataType], and values
/// round-trip bit-exactly through their little-endian byte representation.
pub trait FieldValue: Copy {
    /// The dimension storage type corresponding to this Rust type
    const DATA_TYPE: DimensionDataType;

    fn write_le(self, target: &mut [u8]);
    fn read_le(source: &[u8]) -> Self;
}

macro_rules! impl_field_value {
    ($prim:ty, $datatype:expr) => {
        impl FieldValue for $prim {
            const DATA_TYPE: DimensionDataType = $datatype;

            fn write_le(self, target: &mut [u8]) {
                target.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(source: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$prim>()];
                raw.copy_from_slice(source);
                <$prim>::from_le_bytes(raw)
            }
        }
    };
}

impl_field_value!(u8, DimensionDataType::U8);
impl_field_value!(i8, DimensionDataType::I8);
impl_field_value!(u16, DimensionDataType::U16);
impl_field_value!(i16, DimensionDataType::I16);
impl_field_value!(u32, DimensionDataType::U32);
impl_field_value!(i32, DimensionDataType::I32);
impl_field_value!(u64, DimensionDataType::U64);
impl_field_value!(i64, DimensionDataType::I64);
impl_field_value!(f32, DimensionDataType::F32);
impl_field_value!(f64, DimensionDataType::F64);

/// A capacity-bounded, schema-typed table of points. The buffer owns interleaved
/// storage for up to `capacity` points across all dimensions of its schema, plus a
/// mutable count of how many leading points are currently valid.
///
/// A buffer is typically reused across many read calls. Its valid count is reset by
/// each producer rather than accumulated, and it never grows implicitly: writing past
/// the capacity is an error, not a reallocation.
///
/// ```
/// # use std::sync::Arc;
/// # use pointpipe_core::containers::PointBuffer;
/// # use pointpipe_core::layout::{DimensionKind, Schema};
/// let schema = Arc::new(Schema::from_point_format(0).unwrap());
/// let mut buffer = PointBuffer::new(Arc::clone(&schema), 16);
/// let index_x = schema.index_of(DimensionKind::X).unwrap();
/// buffer.set_field(0, index_x, 42_i32).unwrap();
/// buffer.set_valid_count(1).unwrap();
/// assert_eq!(42_i32, buffer.get_field(0, index_x).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct PointBuffer {
    schema: Arc<Schema>,
    capacity: usize,
    valid_count: usize,
    point_size: usize,
    data: Vec<u8>,
}

impl PointBuffer {
    /// Allocates zero-initialized storage for up to `capacity` points with the given schema
    pub fn new(schema: Arc<Schema>, capacity: usize) -> Self {
        let point_size = schema.point_size();
        Self {
            schema,
            capacity,
            valid_count: 0,
            point_size,
            data: vec![0u8; capacity * point_size],
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the maximum number of points this buffer can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many leading points are currently considered populated
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    /// Sets how many leading points are considered populated. Producers that fill
    /// fewer points than the capacity (e.g. a filter that rejects some) must call
    /// this to report the real count. The buffer does not enforce that the points
    /// were actually written first; that is the producer's responsibility.
    pub fn set_valid_count(&mut self, count: usize) -> Result<(), PipelineError> {
        if count > self.capacity {
            return Err(PipelineError::IndexOutOfRange {
                what: "valid point count",
                index: count,
                limit: self.capacity,
            });
        }
        self.valid_count = count;
        Ok(())
    }

    /// Writes a single field value. The point index is checked against the capacity
    /// (not the valid count, since producers write before counting a point valid).
    /// Panics if the type of `value` does not match the dimension's storage type,
    /// since that is a programming error rather than a runtime data error.
    pub fn set_field<T: FieldValue>(
        &mut self,
        point_index: usize,
        dimension_index: usize,
        value: T,
    ) -> Result<(), PipelineError> {
        if point_index >= self.capacity {
            return Err(PipelineError::IndexOutOfRange {
                what: "point",
                index: point_index,
                limit: self.capacity,
            });
        }
        let dimension = self.checked_dimension(dimension_index)?;
        if dimension.datatype() != T::DATA_TYPE {
            panic!(
                "PointBuffer::set_field: value type {:?} does not match dimension type {:?}",
                T::DATA_TYPE,
                dimension.datatype()
            );
        }

        let start = point_index * self.point_size + self.schema.offset_of(dimension_index).unwrap();
        value.write_le(&mut self.data[start..start + dimension.size()]);
        Ok(())
    }

    /// Reads a single field value back. The point index is checked against the valid
    /// count: fields beyond it are never handed to consumers. Panics if `T` does not
    /// match the dimension's storage type.
    pub fn get_field<T: FieldValue>(
        &self,
        point_index: usize,
        dimension_index: usize,
    ) -> Result<T, PipelineError> {
        if point_index >= self.valid_count {
            return Err(PipelineError::IndexOutOfRange {
                what: "point",
                index: point_index,
                limit: self.valid_count,
            });
        }
        let dimension = self.checked_dimension(dimension_index)?;
        if dimension.datatype() != T::DATA_TYPE {
            panic!(
                "PointBuffer::get_field: value type {:?} does not match dimension type {:?}",
                T::DATA_TYPE,
                dimension.datatype()
            );
        }

        let start = point_index * self.point_size + self.schema.offset_of(dimension_index).unwrap();
        Ok(T::read_le(&self.data[start..start + dimension.size()]))
    }

    /// Reads a field of any numeric storage type, widened to `f64`. Used by
    /// predicates (like a spatial crop) that do not care about the exact storage
    /// type of a coordinate field.
    pub fn get_field_as_f64(
        &self,
        point_index: usize,
        dimension_index: usize,
    ) -> Result<f64, PipelineError> {
        let datatype = self.checked_dimension(dimension_index)?.datatype();
        let value = match datatype {
            DimensionDataType::U8 => self.get_field::<u8>(point_index, dimension_index)? as f64,
            DimensionDataType::I8 => self.get_field::<i8>(point_index, dimension_index)? as f64,
            DimensionDataType::U16 => self.get_field::<u16>(point_index, dimension_index)? as f64,
            DimensionDataType::I16 => self.get_field::<i16>(point_index, dimension_index)? as f64,
            DimensionDataType::U32 => self.get_field::<u32>(point_index, dimension_index)? as f64,
            DimensionDataType::I32 => self.get_field::<i32>(point_index, dimension_index)? as f64,
            DimensionDataType::U64 => self.get_field::<u64>(point_index, dimension_index)? as f64,
            DimensionDataType::I64 => self.get_field::<i64>(point_index, dimension_index)? as f64,
            DimensionDataType::F32 => self.get_field::<f32>(point_index, dimension_index)? as f64,
            DimensionDataType::F64 => self.get_field::<f64>(point_index, dimension_index)?,
        };
        Ok(value)
    }

    /// Copies the whole point record at `source_index` of `source` into slot
    /// `target_index` of this buffer. The copy is a raw byte copy, so both buffers
    /// must share the same schema; a mismatch panics. The source point must be
    /// valid, the target slot must be within the capacity. Does not change the
    /// valid count of this buffer.
    pub fn copy_point_from(
        &mut self,
        target_index: usize,
        source: &PointBuffer,
        source_index: usize,
    ) -> Result<(), PipelineError> {
        if **source.schema() != *self.schema {
            panic!("PointBuffer::copy_point_from: buffers do not share the same schema!");
        }
        if target_index >= self.capacity {
            return Err(PipelineError::IndexOutOfRange {
                what: "point",
                index: target_index,
                limit: self.capacity,
            });
        }
        if source_index >= source.valid_count() {
            return Err(PipelineError::IndexOutOfRange {
                what: "point",
                index: source_index,
                limit: source.valid_count(),
            });
        }

        let source_start = source_index * self.point_size;
        let target_start = target_index * self.point_size;
        self.data[target_start..target_start + self.point_size]
            .copy_from_slice(&source.data[source_start..source_start + self.point_size]);
        Ok(())
    }

    fn checked_dimension(&self, dimension_index: usize) -> Result<Dimension, PipelineError> {
        self.schema
            .dimension(dimension_index)
            .copied()
            .ok_or(PipelineError::IndexOutOfRange {
                what: "dimension",
                index: dimension_index,
                limit: self.schema.len(),
            })
    }
}
