//! Type descriptor registry
//!
//! Maps opaque type ids to the behavior a table needs from its key and
//! value data: sizing (fixed width or a measuring function), comparison,
//! optional debug formatting, and optional decomposition into two child
//! types (compound keys for many-to-many mirrors).
//!
//! ## Responsibilities
//! - Append-only registration of fixed, variable, and compound descriptors
//! - Built-in descriptors for 4-byte handles and raw byte strings
//! - Dispatch of measure/compare/format by type id
//!
//! The registry is owned by the engine; ids from one engine are meaningless
//! to another.

mod compound;

pub(crate) use compound::{encode_pair, split_pair};

use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::{LatticeError, Result};

// =============================================================================
// Type Ids
// =============================================================================

/// Opaque, validated index into a [`TypeRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Built-in: 4-byte table handle / dense integer, identity hash
    pub const HANDLE: TypeId = TypeId(0);

    /// Built-in: variable-length byte string, content hash
    pub const BYTES: TypeId = TypeId(1);

    /// Raw registry index (debugging aid)
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Which member of a table an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Key,
    Value,
}

// =============================================================================
// Descriptors
// =============================================================================

type MeasureFn = Box<dyn Fn(&[u8]) -> usize>;
type CompareFn = Box<dyn Fn(&[u8], &[u8]) -> Ordering>;
type FormatFn = Box<dyn Fn(&[u8]) -> String>;

/// Sizing discipline for one datum kind
pub enum TypeWidth {
    /// Every datum is exactly this many bytes
    Fixed(usize),

    /// Datum length comes from a measuring function
    Variable(MeasureFn),
}

/// Behavior of one datum kind: sizing, comparison, printing, decomposition
pub struct TypeDescriptor {
    width: TypeWidth,
    compare: Option<CompareFn>,
    format: Option<FormatFn>,
    parts: Option<(TypeId, TypeId)>,
}

impl TypeDescriptor {
    /// Descriptor for fixed-width data
    pub fn fixed(width: usize) -> Self {
        Self {
            width: TypeWidth::Fixed(width),
            compare: None,
            format: None,
            parts: None,
        }
    }

    /// Descriptor for variable-length data
    pub fn variable(measure: impl Fn(&[u8]) -> usize + 'static) -> Self {
        Self {
            width: TypeWidth::Variable(Box::new(measure)),
            compare: None,
            format: None,
            parts: None,
        }
    }

    /// Attach a comparator (default is bytewise)
    pub fn with_compare(mut self, compare: impl Fn(&[u8], &[u8]) -> Ordering + 'static) -> Self {
        self.compare = Some(Box::new(compare));
        self
    }

    /// Attach a debug formatter
    pub fn with_format(mut self, format: impl Fn(&[u8]) -> String + 'static) -> Self {
        self.format = Some(Box::new(format));
        self
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Append-only collection of type descriptors, owned by the engine
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
}

impl TypeRegistry {
    /// Registry pre-seeded with [`TypeId::HANDLE`] and [`TypeId::BYTES`]
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Self { types: Vec::new() };

        // TypeId::HANDLE
        registry.register(TypeDescriptor::fixed(4).with_format(|datum| {
            match <[u8; 4]>::try_from(datum) {
                Ok(raw) => u32::from_ne_bytes(raw).to_string(),
                Err(_) => format!("{:02x?}", datum),
            }
        }));

        // TypeId::BYTES
        registry.register(
            TypeDescriptor::variable(<[u8]>::len)
                .with_format(|datum| String::from_utf8_lossy(datum).into_owned()),
        );

        registry
    }

    /// Register a descriptor, returning its id
    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(descriptor);
        id
    }

    /// Register a compound descriptor: two child types concatenated.
    ///
    /// The stored form is `head_len (4 bytes) || head || tail`, so
    /// variable-length heads self-delimit.
    pub fn register_compound(&mut self, head: TypeId, tail: TypeId) -> Result<TypeId> {
        self.descriptor(head)?;
        self.descriptor(tail)?;
        let mut descriptor = TypeDescriptor::variable(<[u8]>::len);
        descriptor.parts = Some((head, tail));
        Ok(self.register(descriptor))
    }

    fn descriptor(&self, id: TypeId) -> Result<&TypeDescriptor> {
        self.types
            .get(id.0 as usize)
            .ok_or(LatticeError::UnknownType(id.0))
    }

    /// Validate that a type id is registered
    pub fn check(&self, id: TypeId) -> Result<()> {
        self.descriptor(id).map(|_| ())
    }

    /// Fixed width of a type, or `None` for variable-length types
    pub fn fixed_width(&self, id: TypeId) -> Result<Option<usize>> {
        match self.descriptor(id)?.width {
            TypeWidth::Fixed(width) => Ok(Some(width)),
            TypeWidth::Variable(_) => Ok(None),
        }
    }

    /// Size of a datum under a type: fixed width or measured length
    pub fn measure(&self, id: TypeId, datum: &[u8]) -> Result<usize> {
        match &self.descriptor(id)?.width {
            TypeWidth::Fixed(width) => Ok(*width),
            TypeWidth::Variable(measure) => Ok(measure(datum)),
        }
    }

    /// Compare two data under a type.
    ///
    /// Custom comparator if attached, part-wise for compounds, bytewise
    /// otherwise.
    pub fn compare(&self, id: TypeId, a: &[u8], b: &[u8]) -> Result<Ordering> {
        let descriptor = self.descriptor(id)?;
        if let Some(compare) = &descriptor.compare {
            return Ok(compare(a, b));
        }
        if let Some((head, tail)) = descriptor.parts {
            if let (Some((ha, ta)), Some((hb, tb))) = (split_pair(a), split_pair(b)) {
                return Ok(self
                    .compare(head, ha, hb)?
                    .then(self.compare(tail, ta, tb)?));
            }
        }
        Ok(a.cmp(b))
    }

    /// Render a datum for debugging
    pub fn format(&self, id: TypeId, datum: &[u8]) -> Result<String> {
        let descriptor = self.descriptor(id)?;
        if let Some(format) = &descriptor.format {
            return Ok(format(datum));
        }
        if let Some((head, tail)) = descriptor.parts {
            if let Some((h, t)) = split_pair(datum) {
                return Ok(format!(
                    "({}, {})",
                    self.format(head, h)?,
                    self.format(tail, t)?
                ));
            }
        }
        Ok(format!("{:02x?}", datum))
    }

    /// Recover the two parts of a compound datum
    pub fn split(&self, id: TypeId, datum: &[u8]) -> Result<(Bytes, Bytes)> {
        let descriptor = self.descriptor(id)?;
        if descriptor.parts.is_none() {
            return Err(LatticeError::NotCompound(id.0));
        }
        split_pair(datum)
            .map(|(head, tail)| (Bytes::copy_from_slice(head), Bytes::copy_from_slice(tail)))
            .ok_or(LatticeError::WidthMismatch {
                expected: 4,
                actual: datum.len(),
            })
    }
}
