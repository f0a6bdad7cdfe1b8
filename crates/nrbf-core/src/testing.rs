//! Hand-rolled payload writer for tests.

/// Declared type of a member or element, as written on the wire
#[derive(Debug, Clone, Copy)]
pub(crate) enum Member<'a> {
    Primitive(u8),
    String,
    Object,
    SystemClass(&'a str),
    Class(&'a str, i32),
    ObjectArray,
    StringArray,
    PrimitiveArray(u8),
}

impl Member<'_> {
    fn binary_type(&self) -> u8 {
        match self {
            Self::Primitive(_) => 0,
            Self::String => 1,
            Self::Object => 2,
            Self::SystemClass(_) => 3,
            Self::Class(..) => 4,
            Self::ObjectArray => 5,
            Self::StringArray => 6,
            Self::PrimitiveArray(_) => 7,
        }
    }
}

/// Primitive type tags
pub(crate) mod kind {
    pub(crate) const BOOLEAN: u8 = 1;
    pub(crate) const BYTE: u8 = 2;
    pub(crate) const INT32: u8 = 8;
    pub(crate) const INT64: u8 = 9;
    pub(crate) const UINT64: u8 = 16;
}

/// Builds payload bytes record by record
#[derive(Debug, Default)]
pub(crate) struct PayloadBuilder {
    data: Vec<u8>,
}

impl PayloadBuilder {
    /// Start a payload with a version 1.0 header
    pub(crate) fn new(root: i32) -> Self {
        Self::with_header(root, 1, 0)
    }

    pub(crate) fn with_header(root: i32, major: i32, minor: i32) -> Self {
        Self::default().u8(0).i32(root).i32(-1).i32(major).i32(minor)
    }

    pub(crate) fn u8(mut self, value: u8) -> Self {
        self.data.push(value);
        self
    }

    pub(crate) fn i32(mut self, value: i32) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn i64(mut self, value: i64) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn u64(mut self, value: u64) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Length-prefixed UTF-8 string
    pub(crate) fn string(mut self, value: &str) -> Self {
        let mut len = value.len();
        while len >= 0x80 {
            self.data.push((len as u8) | 0x80);
            len >>= 7;
        }
        self.data.push(len as u8);
        self.data.extend_from_slice(value.as_bytes());
        self
    }

    fn members(mut self, members: &[(&str, Member<'_>)]) -> Self {
        self = self.i32(members.len() as i32);
        for (name, _) in members {
            self = self.string(name);
        }
        self.member_types(members.iter().map(|(_, member)| *member))
    }

    fn member_types<'a>(mut self, types: impl Iterator<Item = Member<'a>> + Clone) -> Self {
        for member in types.clone() {
            self = self.u8(member.binary_type());
        }
        for member in types {
            self = match member {
                Member::Primitive(kind) | Member::PrimitiveArray(kind) => self.u8(kind),
                Member::SystemClass(name) => self.string(name),
                Member::Class(name, library) => self.string(name).i32(library),
                Member::String | Member::Object | Member::ObjectArray | Member::StringArray => self,
            };
        }
        self
    }

    pub(crate) fn library(self, id: i32, name: &str) -> Self {
        self.u8(12).i32(id).string(name)
    }

    pub(crate) fn object_string(self, id: i32, value: &str) -> Self {
        self.u8(6).i32(id).string(value)
    }

    /// `SystemClassWithMembersAndTypes` header; member values follow
    pub(crate) fn system_class(self, id: i32, name: &str, members: &[(&str, Member<'_>)]) -> Self {
        self.u8(4).i32(id).string(name).members(members)
    }

    /// `ClassWithMembersAndTypes` header; member values follow
    pub(crate) fn class(self, id: i32, name: &str, members: &[(&str, Member<'_>)], library: i32) -> Self {
        self.u8(5).i32(id).string(name).members(members).i32(library)
    }

    pub(crate) fn class_with_id(self, id: i32, metadata_id: i32) -> Self {
        self.u8(1).i32(id).i32(metadata_id)
    }

    pub(crate) fn reference(self, id: i32) -> Self {
        self.u8(9).i32(id)
    }

    pub(crate) fn null(self) -> Self {
        self.u8(10)
    }

    /// Null run using the smallest encoding
    pub(crate) fn nulls(self, count: i32) -> Self {
        if count < 256 {
            self.u8(13).u8(count as u8)
        } else {
            self.u8(14).i32(count)
        }
    }

    pub(crate) fn primitive_typed(self, kind: u8, value: &[u8]) -> Self {
        self.u8(8).u8(kind).raw(value)
    }

    pub(crate) fn array_single_object(self, id: i32, length: i32) -> Self {
        self.u8(16).i32(id).i32(length)
    }

    pub(crate) fn array_single_string(self, id: i32, length: i32) -> Self {
        self.u8(17).i32(id).i32(length)
    }

    /// `ArraySinglePrimitive` header; packed values follow
    pub(crate) fn array_single_primitive(self, id: i32, length: i32, kind: u8) -> Self {
        self.u8(15).i32(id).i32(length).u8(kind)
    }

    /// `BinaryArray` header; elements follow
    pub(crate) fn binary_array(
        mut self,
        id: i32,
        array_kind: u8,
        lengths: &[i32],
        lower_bounds: Option<&[i32]>,
        element: Member<'_>,
    ) -> Self {
        self = self.u8(7).i32(id).u8(array_kind).i32(lengths.len() as i32);
        for length in lengths {
            self = self.i32(*length);
        }
        for bound in lower_bounds.unwrap_or_default() {
            self = self.i32(*bound);
        }
        self.member_types(std::iter::once(element))
    }

    /// Append the end record and return the bytes
    pub(crate) fn end(self) -> Vec<u8> {
        self.u8(11).build()
    }

    /// Return the bytes as written so far
    pub(crate) fn build(self) -> Vec<u8> {
        self.data
    }
}
