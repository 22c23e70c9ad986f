use crate::error::PipelineError;

/// Identifies a named per-point field. Dimensions are identified by their kind, so a
/// schema can carry each kind at most once. Application-defined fields use the
/// `Custom` variant with a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    X,
    Y,
    Z,
    Intensity,
    ReturnNumber,
    NumberOfReturns,
    ScanDirectionFlag,
    EdgeOfFlightLine,
    Classification,
    ScanAngleRank,
    UserData,
    PointSourceId,
    GpsTime,
    Red,
    Green,
    Blue,
    /// An application-defined dimension, identified by name
    Custom(&'static str),
}

/// Possible storage types for a single dimension value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionDataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DimensionDataType {
    /// Returns the size in bytes of a single value of this type
    pub fn size(&self) -> usize {
        match self {
            DimensionDataType::U8 | DimensionDataType::I8 => 1,
            DimensionDataType::U16 | DimensionDataType::I16 => 2,
            DimensionDataType::U32 | DimensionDataType::I32 | DimensionDataType::F32 => 4,
            DimensionDataType::U64 | DimensionDataType::I64 | DimensionDataType::F64 => 8,
        }
    }
}

/// A definition for a single point dimension: a field kind together with the storage
/// type a single value of the field is stored in. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    kind: DimensionKind,
    datatype: DimensionDataType,
}

impl Dimension {
    pub fn new(kind: DimensionKind, datatype: DimensionDataType) -> Self {
        Self { kind, datatype }
    }

    pub fn kind(&self) -> DimensionKind {
        self.kind
    }

    pub fn datatype(&self) -> DimensionDataType {
        self.datatype
    }

    /// Returns the size in bytes of a single value of this dimension
    pub fn size(&self) -> usize {
        self.datatype.size()
    }
}

/// An ordered set of dimensions with unique kinds. Every dimension gets a stable
/// integer index assigned at registration time; all field access on a
/// [PointBuffer](crate::containers::PointBuffer) goes through these indices.
///
/// A schema is built once per pipeline (usually derived from a file's point format
/// id via [from_point_format](Schema::from_point_format)) and then shared by
/// reference between stages, iterators and buffers. It is never mutated after
/// construction.
///
/// ```
/// # use pointpipe_core::layout::*;
/// let schema = Schema::from_point_format(0).unwrap();
/// assert_eq!(0, schema.index_of(DimensionKind::X).unwrap());
/// assert_eq!(23, schema.point_size());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    dimensions: Vec<Dimension>,
    offsets: Vec<usize>,
}

impl Schema {
    /// Creates a new empty schema
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    /// Builds the schema of required dimensions for the given point data format id.
    /// Formats 0-5 are supported; formats 4 and 5 share the field layout of formats
    /// 1 and 3 since the waveform block is not modeled as dimensions. Fails with
    /// `InvalidPointFormat` for any other id.
    pub fn from_point_format(format: u8) -> Result<Self, PipelineError> {
        if format > 5 {
            return Err(PipelineError::InvalidPointFormat(format));
        }

        let mut schema = Self::new();
        schema.add_dimension(Dimension::new(DimensionKind::X, DimensionDataType::I32));
        schema.add_dimension(Dimension::new(DimensionKind::Y, DimensionDataType::I32));
        schema.add_dimension(Dimension::new(DimensionKind::Z, DimensionDataType::I32));
        schema.add_dimension(Dimension::new(
            DimensionKind::Intensity,
            DimensionDataType::U16,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::ReturnNumber,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::NumberOfReturns,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::ScanDirectionFlag,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::EdgeOfFlightLine,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::Classification,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::ScanAngleRank,
            DimensionDataType::I8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::UserData,
            DimensionDataType::U8,
        ));
        schema.add_dimension(Dimension::new(
            DimensionKind::PointSourceId,
            DimensionDataType::U16,
        ));

        if format_has_gps_time(format) {
            schema.add_dimension(Dimension::new(
                DimensionKind::GpsTime,
                DimensionDataType::F64,
            ));
        }
        if format_has_colors(format) {
            schema.add_dimension(Dimension::new(DimensionKind::Red, DimensionDataType::U16));
            schema.add_dimension(Dimension::new(DimensionKind::Green, DimensionDataType::U16));
            schema.add_dimension(Dimension::new(DimensionKind::Blue, DimensionDataType::U16));
        }

        Ok(schema)
    }

    /// Appends the given dimension to this schema. Used by readers whose on-disk
    /// records are wider than the required fields of their point format. Panics if a
    /// dimension with the same kind is already registered, since duplicate kinds are
    /// a programming error rather than a runtime data error.
    pub fn add_dimension(&mut self, dimension: Dimension) {
        if self.has_dimension(dimension.kind()) {
            panic!(
                "Dimension {:?} is already present in this schema!",
                dimension.kind()
            );
        }

        // The offset of the new dimension is the end of the previous one
        if self.dimensions.is_empty() {
            self.offsets.push(0);
        } else {
            self.offsets
                .push(self.offsets.last().unwrap() + self.dimensions.last().unwrap().size());
        }

        self.dimensions.push(dimension);
    }

    /// Returns true if a dimension of the given kind is part of this schema
    pub fn has_dimension(&self, kind: DimensionKind) -> bool {
        self.dimensions
            .iter()
            .any(|dimension| dimension.kind() == kind)
    }

    /// Returns the stable index of the dimension with the given kind. Fails with
    /// `UnknownDimension` if the kind was never registered for this schema.
    ///
    /// ```
    /// # use pointpipe_core::layout::*;
    /// let schema = Schema::from_point_format(1).unwrap();
    /// assert!(schema.index_of(DimensionKind::GpsTime).is_ok());
    /// assert!(schema.index_of(DimensionKind::Red).is_err());
    /// ```
    pub fn index_of(&self, kind: DimensionKind) -> Result<usize, PipelineError> {
        self.dimensions
            .iter()
            .position(|dimension| dimension.kind() == kind)
            .ok_or(PipelineError::UnknownDimension(kind))
    }

    /// Returns the dimension at the given index, or `None` if the index is out of range
    pub fn dimension(&self, index: usize) -> Option<&Dimension> {
        self.dimensions.get(index)
    }

    /// Returns an iterator over all dimensions in this schema, in registration order
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter()
    }

    /// Returns the number of dimensions in this schema
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Returns the byte offset of the dimension at the given index within a tightly
    /// packed point record, or `None` if the index is out of range
    pub fn offset_of(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Returns the size in bytes of a single tightly packed point record with this schema
    pub fn point_size(&self) -> usize {
        self.dimensions
            .iter()
            .fold(0, |acc, dimension| acc + dimension.size())
    }
}

/// Returns true if the given point format carries a GPS time field
pub fn format_has_gps_time(format: u8) -> bool {
    matches!(format, 1 | 3 | 4 | 5)
}

/// Returns true if the given point format carries RGB color fields
pub fn format_has_colors(format: u8) -> bool {
    matches!(format, 2 | 3 | 5)
}

/// Returns true if the given point format carries a waveform block
pub fn format_has_waveform(format: u8) -> bool {
    matches!(format, 4 | 5)
}
