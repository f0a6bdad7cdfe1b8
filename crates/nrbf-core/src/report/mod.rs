//! Reporting over decoded payloads.
//!
//! [`walk`] visits the object graph from the root in depth-first order and
//! hands each node to a [`RecordWriter`]. The walk keeps its own work stack and
//! a visited set, so arbitrarily deep or cyclic graphs are safe: a record
//! reached a second time is reported as a back reference.
//!
//! [`render_tree`] uses the walk to produce an indented text dump.

mod writer;

use crate::decoder::Payload;
use crate::record::{
    ArrayRecord, ElementRun, LibraryRecord, MemberType, PrimitiveValue, RecordId, RecordValue,
    SerializationRecord,
};
use std::collections::HashSet;
use std::fmt::{self, Write as FmtWrite};

pub use writer::{NullWriter, RecordWriter, Slot, StatsWriter};

/// Configuration for the text tree
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// List library declarations before the tree
    pub show_libraries: bool,
    /// Values of a primitive array shown inline
    pub preview_elements: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            show_libraries: false,
            preview_elements: 8,
        }
    }
}

impl ReportConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether libraries are listed
    pub fn show_libraries(mut self, show: bool) -> Self {
        self.show_libraries = show;
        self
    }

    /// Sets how many primitive array values are shown
    pub fn preview_elements(mut self, count: usize) -> Self {
        self.preview_elements = count;
        self
    }
}

/// One pending node of the walk
enum Visit<'a> {
    Value {
        depth: usize,
        slot: Slot<'a>,
        value: RecordValue,
    },
    Nulls {
        depth: usize,
        slot: Slot<'a>,
        count: u32,
    },
}

/// Visit every node reachable from the root.
///
/// Libraries are reported first, in decode order. Primitive array elements
/// are not visited individually; writers read them from the array record.
pub fn walk<W: RecordWriter + ?Sized>(payload: &Payload, writer: &mut W) -> fmt::Result {
    for library in payload.records().iter().filter_map(SerializationRecord::as_library) {
        writer.write_library(library)?;
    }

    let mut visited: HashSet<RecordId> = HashSet::new();
    let mut children = Vec::new();
    let mut stack = vec![Visit::Value {
        depth: 0,
        slot: Slot::Root,
        value: RecordValue::Record(payload.root().id()),
    }];

    while let Some(visit) = stack.pop() {
        let (depth, slot, value) = match visit {
            Visit::Nulls { depth, slot, count } => {
                writer.write_nulls(depth, slot, count)?;
                continue;
            }
            Visit::Value { depth, slot, value } => (depth, slot, value),
        };

        let id = match value {
            RecordValue::Null => {
                writer.write_nulls(depth, slot, 1)?;
                continue;
            }
            RecordValue::Primitive(value) => {
                writer.write_primitive(depth, slot, &value)?;
                continue;
            }
            RecordValue::Record(id) => id,
        };

        let Some(record) = payload.get(id) else {
            continue;
        };
        if !visited.insert(id) {
            writer.write_back_reference(depth, slot, id)?;
            continue;
        }

        writer.write_record(depth, slot, record)?;
        push_children(record, depth + 1, &mut children);
        stack.extend(children.drain(..).rev());
    }

    Ok(())
}

fn push_children<'a>(record: &'a SerializationRecord, depth: usize, out: &mut Vec<Visit<'a>>) {
    match record {
        SerializationRecord::Class(class) => {
            for (name, _, value) in class.members() {
                out.push(Visit::Value {
                    depth,
                    slot: Slot::Member(name),
                    value: *value,
                });
            }
        }
        SerializationRecord::Array(array) => {
            let mut index = 0;
            for run in array.runs() {
                match run {
                    ElementRun::Value(value) => {
                        out.push(Visit::Value {
                            depth,
                            slot: Slot::Element(index),
                            value: *value,
                        });
                        index += 1;
                    }
                    ElementRun::Nulls(count) => {
                        out.push(Visit::Nulls {
                            depth,
                            slot: Slot::Element(index),
                            count: *count,
                        });
                        index += *count as usize;
                    }
                }
            }
        }
        SerializationRecord::Library(_)
        | SerializationRecord::String(_)
        | SerializationRecord::Primitive(_) => {}
    }
}

/// Writes the indented text tree
pub struct TreeWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a ReportConfig,
}

impl<'a, W: FmtWrite> TreeWriter<'a, W> {
    /// Creates a tree writer over `writer`
    pub fn new(writer: &'a mut W, config: &'a ReportConfig) -> Self {
        Self { writer, config }
    }

    fn write_prefix(&mut self, depth: usize, slot: Slot<'_>) -> fmt::Result {
        for _ in 0..depth {
            self.writer.write_str(&self.config.indent_str)?;
        }
        match slot {
            Slot::Root => Ok(()),
            slot => write!(self.writer, "{slot}: "),
        }
    }

    fn write_array(&mut self, array: &ArrayRecord) -> fmt::Result {
        let dims = array
            .lengths()
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(self.writer, "#{} {}[{}]", array.id().0, element_name(array.element_type()), dims)?;

        let Some(values) = array.primitive_values() else {
            return Ok(());
        };
        let shown = values.len().min(self.config.preview_elements);
        if shown == 0 {
            return Ok(());
        }
        self.writer.write_str(" = [")?;
        for index in 0..shown {
            if index > 0 {
                self.writer.write_str(", ")?;
            }
            if let Some(value) = values.get(index) {
                write!(self.writer, "{value}")?;
            }
        }
        if values.len() > shown {
            write!(self.writer, ", ... {} more", values.len() - shown)?;
        }
        self.writer.write_char(']')
    }
}

impl<W: FmtWrite> RecordWriter for TreeWriter<'_, W> {
    fn write_library(&mut self, library: &LibraryRecord) -> fmt::Result {
        if self.config.show_libraries {
            writeln!(self.writer, "library #{} {}", library.id.0, library.name)?;
        }
        Ok(())
    }

    fn write_record(&mut self, depth: usize, slot: Slot<'_>, record: &SerializationRecord) -> fmt::Result {
        self.write_prefix(depth, slot)?;
        match record {
            SerializationRecord::Class(class) => {
                write!(self.writer, "#{} {}", class.id().0, class.type_name().full_name())?;
                if let Some(key) = class.resolved_type() {
                    write!(self.writer, " ({key})")?;
                }
            }
            SerializationRecord::Array(array) => self.write_array(array)?,
            SerializationRecord::String(string) => {
                write!(self.writer, "#{} {:?}", string.id.0, string.value)?;
            }
            SerializationRecord::Primitive(boxed) => {
                write!(self.writer, "#{} {}", boxed.id.0, boxed.value)?;
            }
            SerializationRecord::Library(library) => {
                write!(self.writer, "#{} library {}", library.id.0, library.name)?;
            }
        }
        self.writer.write_char('\n')
    }

    fn write_back_reference(&mut self, depth: usize, slot: Slot<'_>, id: RecordId) -> fmt::Result {
        self.write_prefix(depth, slot)?;
        writeln!(self.writer, "-> #{}", id.0)
    }

    fn write_primitive(&mut self, depth: usize, slot: Slot<'_>, value: &PrimitiveValue) -> fmt::Result {
        self.write_prefix(depth, slot)?;
        writeln!(self.writer, "{value}")
    }

    fn write_nulls(&mut self, depth: usize, slot: Slot<'_>, count: u32) -> fmt::Result {
        self.write_prefix(depth, slot)?;
        match count {
            1 => writeln!(self.writer, "null"),
            count => writeln!(self.writer, "null x{count}"),
        }
    }
}

fn element_name(element: &MemberType) -> String {
    match element {
        MemberType::Primitive(kind) => format!("{kind:?}"),
        MemberType::String => "String".to_string(),
        MemberType::Object => "Object".to_string(),
        MemberType::SystemClass(name) | MemberType::Class { type_name: name, .. } => name.full_name(),
        MemberType::ObjectArray => "Object[]".to_string(),
        MemberType::StringArray => "String[]".to_string(),
        MemberType::PrimitiveArray(kind) => format!("{kind:?}[]"),
    }
}

/// Write the text tree of `payload` to `w`
pub fn write_tree(payload: &Payload, w: &mut impl FmtWrite, config: &ReportConfig) -> fmt::Result {
    walk(payload, &mut TreeWriter::new(w, config))
}

/// Render the text tree of `payload` with default settings
pub fn render_tree(payload: &Payload) -> String {
    let mut output = String::new();
    write_tree(payload, &mut output, &ReportConfig::default()).expect("String write cannot fail");
    output
}

/// Gather graph statistics for `payload`
pub fn collect_stats(payload: &Payload) -> StatsWriter {
    let mut stats = StatsWriter::default();
    walk(payload, &mut stats).expect("StatsWriter cannot fail");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode, DecodeOptions};
    use crate::testing::{kind, Member, PayloadBuilder};
    use pretty_assertions::assert_eq;

    fn decode_bytes(data: &[u8]) -> Payload {
        decode(data, &DecodeOptions::default()).unwrap()
    }

    fn pair_payload() -> Payload {
        decode_bytes(
            &PayloadBuilder::new(1)
                .library(3, "App")
                .class(
                    1,
                    "App.Pair",
                    &[("first", Member::Object), ("second", Member::Object), ("n", Member::Primitive(kind::INT32))],
                    3,
                )
                .class(2, "App.Node", &[("next", Member::Object)], 3)
                .reference(1)
                .reference(2)
                .i32(7)
                .end(),
        )
    }

    #[test]
    fn test_render_tree_with_cycles() {
        let expected = "\
#1 App.Pair
  first: #2 App.Node
    next: -> #1
  second: -> #2
  n: 7i32
";
        assert_eq!(render_tree(&pair_payload()), expected);
    }

    #[test]
    fn test_render_arrays() {
        let payload = decode_bytes(
            &PayloadBuilder::new(1)
                .array_single_object(1, 5)
                .object_string(2, "a\"b")
                .nulls(3)
                .array_single_primitive(3, 10, kind::BYTE)
                .raw(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
                .end(),
        );
        let config = ReportConfig::new().indent_str("\t").preview_elements(3);
        let mut output = String::new();
        write_tree(&payload, &mut output, &config).unwrap();

        let expected = "\
#1 Object[5]
\t[0]: #2 \"a\\\"b\"
\t[1]: null x3
\t[4]: #3 Byte[10] = [0u8, 1u8, 2u8, ... 7 more]
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_libraries_listed_on_request() {
        let config = ReportConfig::new().show_libraries(true);
        let mut output = String::new();
        write_tree(&pair_payload(), &mut output, &config).unwrap();
        assert!(output.starts_with("library #3 App\n#1 App.Pair\n"));
    }

    #[test]
    fn test_collect_stats() {
        let stats = collect_stats(&pair_payload());
        assert_eq!(
            stats,
            StatsWriter {
                library_count: 1,
                class_count: 2,
                array_count: 0,
                string_count: 0,
                boxed_count: 0,
                primitive_count: 1,
                null_count: 0,
                back_reference_count: 2,
                max_depth: 2,
            }
        );
    }

    #[test]
    fn test_walk_deep_graph() {
        const DEPTH: i32 = 5_000;
        let mut builder = PayloadBuilder::new(1);
        for id in 1..=DEPTH {
            builder = builder.array_single_object(id, 1);
        }
        let payload = decode_bytes(&builder.null().end());

        let stats = collect_stats(&payload);
        assert_eq!(stats.array_count, DEPTH as usize);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.max_depth, DEPTH as usize);
    }
}
