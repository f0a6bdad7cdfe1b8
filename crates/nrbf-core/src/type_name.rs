//! Parsing of assembly-qualified type names.
//!
//! Class and member type metadata carry type names in the textual grammar used
//! by the producing runtime:
//!
//! ```text
//! Namespace.Outer+Inner`2[[Arg1, Asm1],[Arg2, Asm2]][], AssemblyName, Version=1.0.0.0
//! ```
//!
//! A name is reduced to its simple (possibly nested) name, its generic
//! arguments, its decorators (array, pointer, by-ref) and an optional assembly
//! name. Nothing is ever loaded or resolved against a real type system.

use crate::error::{Error, Result};
use std::fmt;

/// Default limit on generic argument nesting
pub const DEFAULT_MAX_TYPE_NAME_DEPTH: usize = 16;

/// Highest array rank a type name may declare
pub const MAX_ARRAY_RANK: u32 = 32;

/// A suffix modifying the type it follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDecorator {
    /// Single-dimension zero-based array, `[]`
    SzArray,
    /// Multi-dimensional array of the given rank, `[,]` (or `[*]` for rank 1)
    Array(u32),
    /// Unmanaged pointer, `*`
    Pointer,
    /// Managed reference, `&`
    ByRef,
}

/// A parsed type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    name: String,
    generic_arguments: Vec<TypeName>,
    decorators: Vec<TypeDecorator>,
    assembly_name: Option<String>,
}

impl TypeName {
    /// Parses an (optionally assembly-qualified) type name
    pub fn parse(input: &str, max_depth: usize) -> Result<Self> {
        let mut parser = Parser {
            input,
            pos: 0,
            max_depth,
        };
        let name = parser.assembly_qualified(0, false)?;
        parser.skip_whitespace();
        if parser.pos != input.len() {
            return Err(parser.error(format!("unexpected trailing input at {}", parser.pos)));
        }
        Ok(name)
    }

    /// Name without generic arguments, decorators or assembly
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace portion of the name, if any
    pub fn namespace(&self) -> Option<&str> {
        let outer = self.name.split('+').next().unwrap_or(&self.name);
        outer.rfind('.').map(|i| &outer[..i])
    }

    /// Generic type arguments
    pub fn generic_arguments(&self) -> &[TypeName] {
        &self.generic_arguments
    }

    /// Decorators in application order
    pub fn decorators(&self) -> &[TypeDecorator] {
        &self.decorators
    }

    /// Assembly the type lives in, if qualified
    pub fn assembly_name(&self) -> Option<&str> {
        self.assembly_name.as_deref()
    }

    /// Returns the name qualified with `assembly` unless it already names one
    pub fn with_default_assembly(mut self, assembly: &str) -> Self {
        if self.assembly_name.is_none() {
            self.assembly_name = Some(assembly.to_string());
        }
        self
    }

    /// Returns true if the outermost decorator is an array
    pub fn is_array(&self) -> bool {
        matches!(
            self.decorators.last(),
            Some(TypeDecorator::SzArray | TypeDecorator::Array(_))
        )
    }

    /// Rank of the outermost array decorator
    pub fn array_rank(&self) -> Option<u32> {
        match self.decorators.last()? {
            TypeDecorator::SzArray => Some(1),
            TypeDecorator::Array(rank) => Some(*rank),
            _ => None,
        }
    }

    /// The type with its outermost decorator removed
    pub fn element_type(&self) -> Option<TypeName> {
        if self.decorators.is_empty() {
            return None;
        }
        let mut element = self.clone();
        element.decorators.pop();
        Some(element)
    }

    /// Returns true if the name carries generic arguments
    pub fn is_constructed_generic(&self) -> bool {
        !self.generic_arguments.is_empty()
    }

    /// Full name without the assembly, generic arguments assembly-qualified
    pub fn full_name(&self) -> String {
        let mut out = String::new();
        self.write_full_name(&mut out);
        out
    }

    /// Full name followed by the assembly name, if any
    pub fn assembly_qualified_name(&self) -> String {
        let mut out = self.full_name();
        if let Some(assembly) = &self.assembly_name {
            out.push_str(", ");
            out.push_str(assembly);
        }
        out
    }

    fn write_full_name(&self, out: &mut String) {
        out.push_str(&self.name);
        if !self.generic_arguments.is_empty() {
            out.push('[');
            for (i, arg) in self.generic_arguments.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('[');
                out.push_str(&arg.assembly_qualified_name());
                out.push(']');
            }
            out.push(']');
        }
        for decorator in &self.decorators {
            match decorator {
                TypeDecorator::SzArray => out.push_str("[]"),
                TypeDecorator::Array(1) => out.push_str("[*]"),
                TypeDecorator::Array(rank) => {
                    out.push('[');
                    for _ in 1..*rank {
                        out.push(',');
                    }
                    out.push(']');
                }
                TypeDecorator::Pointer => out.push('*'),
                TypeDecorator::ByRef => out.push('&'),
            }
        }
    }

    /// Total generic arity declared by the backtick suffixes of each nesting level
    fn declared_arity(&self) -> Option<usize> {
        let mut total = 0usize;
        for segment in self.name.split('+') {
            if let Some((_, arity)) = segment.rsplit_once('`') {
                total = total.checked_add(arity.parse::<usize>().ok()?)?;
            }
        }
        Some(total)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.assembly_qualified_name())
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, details: impl Into<String>) -> Error {
        Error::invalid_type_name(self.input, details)
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_non_whitespace(&self) -> Option<u8> {
        self.input.as_bytes()[self.pos..]
            .iter()
            .copied()
            .find(|b| !b.is_ascii_whitespace())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_whitespace();
        if self.peek() != Some(byte) {
            return Err(self.error(format!("expected '{}' at {}", byte as char, self.pos)));
        }
        self.pos += 1;
        Ok(())
    }

    /// `FullName [',' AssemblyName]`; nested names stop at the closing bracket
    fn assembly_qualified(&mut self, depth: usize, nested: bool) -> Result<TypeName> {
        let mut name = self.full_name(depth)?;
        self.skip_whitespace();
        if self.peek() == Some(b',') {
            self.pos += 1;
            let start = self.pos;
            while let Some(b) = self.peek() {
                if nested && b == b']' {
                    break;
                }
                if b == b'[' || (!nested && b == b']') {
                    return Err(self.error(format!("unexpected '{}' in assembly name", b as char)));
                }
                self.pos += 1;
            }
            let assembly = self.input[start..self.pos].trim();
            if assembly.is_empty() {
                return Err(self.error("empty assembly name"));
            }
            name.assembly_name = Some(assembly.to_string());
        }
        Ok(name)
    }

    /// `SimpleName [GenericArgs] Decorator*`
    fn full_name(&mut self, depth: usize) -> Result<TypeName> {
        if depth > self.max_depth {
            return Err(self.error(format!("generic nesting exceeds depth {}", self.max_depth)));
        }

        self.skip_whitespace();
        let name = self.simple_name()?;
        let mut type_name = TypeName {
            name,
            generic_arguments: Vec::new(),
            decorators: Vec::new(),
            assembly_name: None,
        };

        if self.peek() == Some(b'[') && self.starts_generic_arguments() {
            type_name.generic_arguments = self.generic_arguments(depth)?;
            match type_name.declared_arity() {
                Some(arity) if arity == type_name.generic_arguments.len() => {}
                _ => {
                    return Err(self.error(format!(
                        "'{}' declares a different arity than its {} generic arguments",
                        type_name.name,
                        type_name.generic_arguments.len()
                    )))
                }
            }
        }

        self.decorators(&mut type_name.decorators)?;
        Ok(type_name)
    }

    /// Characters up to the first unescaped delimiter, with escapes resolved
    fn simple_name(&mut self) -> Result<String> {
        let mut name = String::new();
        let mut chunk_start = self.pos;

        while let Some(b) = self.peek() {
            match b {
                b'\\' => {
                    name.push_str(&self.input[chunk_start..self.pos]);
                    self.pos += 1;
                    let escaped = self.input[self.pos..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    name.push(escaped);
                    self.pos += escaped.len_utf8();
                    chunk_start = self.pos;
                }
                b'[' | b']' | b',' | b'*' | b'&' => break,
                _ => self.pos += 1,
            }
        }
        name.push_str(&self.input[chunk_start..self.pos]);

        let name = name.trim_end().to_string();
        if name.is_empty() {
            return Err(self.error(format!("empty type name at {}", self.pos)));
        }
        Ok(name)
    }

    /// A `[` opens generic arguments unless it starts a decorator (`[]`, `[,`, `[*`)
    fn starts_generic_arguments(&self) -> bool {
        let rest = &self.input.as_bytes()[self.pos + 1..];
        match rest.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b']' | b',' | b'*') | None => false,
            Some(_) => true,
        }
    }

    fn generic_arguments(&mut self, depth: usize) -> Result<Vec<TypeName>> {
        self.expect(b'[')?;
        let mut arguments = Vec::new();

        loop {
            self.skip_whitespace();
            let argument = if self.peek() == Some(b'[') {
                self.pos += 1;
                let argument = self.assembly_qualified(depth + 1, true)?;
                self.expect(b']')?;
                argument
            } else {
                self.full_name(depth + 1)?
            };
            arguments.push(argument);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(arguments);
                }
                _ => return Err(self.error(format!("unterminated generic arguments at {}", self.pos))),
            }
        }
    }

    fn decorators(&mut self, decorators: &mut Vec<TypeDecorator>) -> Result<()> {
        loop {
            match self.peek_non_whitespace() {
                Some(b'*') => {
                    self.skip_whitespace();
                    self.pos += 1;
                    decorators.push(TypeDecorator::Pointer);
                }
                Some(b'&') => {
                    self.skip_whitespace();
                    self.pos += 1;
                    decorators.push(TypeDecorator::ByRef);
                }
                Some(b'[') => {
                    self.skip_whitespace();
                    self.pos += 1;
                    decorators.push(self.array_decorator()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn array_decorator(&mut self) -> Result<TypeDecorator> {
        self.skip_whitespace();
        match self.peek() {
            Some(b']') => {
                self.pos += 1;
                Ok(TypeDecorator::SzArray)
            }
            Some(b'*') => {
                self.pos += 1;
                self.expect(b']')?;
                Ok(TypeDecorator::Array(1))
            }
            Some(b',') => {
                let mut rank = 1u32;
                while self.peek() == Some(b',') {
                    rank += 1;
                    if rank > MAX_ARRAY_RANK {
                        return Err(self.error(format!("array rank exceeds {MAX_ARRAY_RANK}")));
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                }
                self.expect(b']')?;
                Ok(TypeDecorator::Array(rank))
            }
            _ => Err(self.error(format!("malformed array decorator at {}", self.pos))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> TypeName {
        TypeName::parse(input, DEFAULT_MAX_TYPE_NAME_DEPTH).unwrap()
    }

    #[test]
    fn test_simple_name() {
        let name = parse("System.Int32");
        assert_eq!(name.name(), "System.Int32");
        assert_eq!(name.namespace(), Some("System"));
        assert!(!name.is_array());
        assert_eq!(name.assembly_name(), None);
    }

    #[test]
    fn test_assembly_qualified() {
        let name = parse("MyApp.Models.User, MyApp, Version=1.0.0.0, Culture=neutral");
        assert_eq!(name.name(), "MyApp.Models.User");
        assert_eq!(name.assembly_name(), Some("MyApp, Version=1.0.0.0, Culture=neutral"));
    }

    #[test]
    fn test_generic_arguments() {
        let name = parse(
            "System.Collections.Generic.Dictionary`2[[System.String, mscorlib],[MyApp.User, MyApp]]",
        );
        assert_eq!(name.name(), "System.Collections.Generic.Dictionary`2");
        assert_eq!(name.generic_arguments().len(), 2);
        assert_eq!(name.generic_arguments()[0].assembly_name(), Some("mscorlib"));
        assert_eq!(name.generic_arguments()[1].name(), "MyApp.User");
        assert_eq!(
            name.full_name(),
            "System.Collections.Generic.Dictionary`2[[System.String, mscorlib],[MyApp.User, MyApp]]"
        );
    }

    #[test]
    fn test_unqualified_generic_argument() {
        let name = parse("System.Collections.Generic.List`1[System.Int32]");
        assert_eq!(name.generic_arguments()[0].name(), "System.Int32");
    }

    #[test]
    fn test_array_decorators() {
        let name = parse("System.Int32[][,]");
        assert!(name.is_array());
        assert_eq!(name.array_rank(), Some(2));
        assert_eq!(
            name.decorators(),
            &[TypeDecorator::SzArray, TypeDecorator::Array(2)]
        );
        let element = name.element_type().unwrap();
        assert_eq!(element.array_rank(), Some(1));
        assert_eq!(element.full_name(), "System.Int32[]");

        assert_eq!(parse("System.Int32[*]").array_rank(), Some(1));
        assert!(!parse("System.Int32*").is_array());
        assert!(!parse("System.Int32[]&").is_array());
    }

    #[test]
    fn test_generic_array() {
        let name = parse("System.Collections.Generic.List`1[[System.Int32, mscorlib]][]");
        assert!(name.is_array());
        assert_eq!(name.generic_arguments().len(), 1);
    }

    #[test]
    fn test_nested_type_arity() {
        let name = parse("Outer`1+Inner`1[[A],[B]]");
        assert_eq!(name.generic_arguments().len(), 2);
        assert!(TypeName::parse("Outer`1+Inner`1[[A]]", 16).is_err());
    }

    #[test]
    fn test_escaped_delimiters() {
        let name = parse(r"Weird\,Name\[\]");
        assert_eq!(name.name(), "Weird,Name[]");
        assert!(!name.is_array());
    }

    #[test]
    fn test_depth_limit() {
        let mut input = String::from("T");
        for _ in 0..5 {
            input = format!("G`1[[{input}]]");
        }
        assert!(TypeName::parse(&input, 5).is_ok());
        assert!(matches!(
            TypeName::parse(&input, 4),
            Err(Error::InvalidTypeName { .. })
        ));
    }

    #[test]
    fn test_malformed_names() {
        for input in ["", "   ", "A[", "A`1[[B]", "A[,", "A, ", "A]", "List`1[[B, ]]", "A\\"] {
            assert!(TypeName::parse(input, 16).is_err(), "{input:?}");
        }
    }

    #[test]
    fn test_rank_limit() {
        let input = format!("A[{}]", ",".repeat(MAX_ARRAY_RANK as usize));
        assert!(TypeName::parse(&input, 16).is_err());
        let input = format!("A[{}]", ",".repeat(MAX_ARRAY_RANK as usize - 1));
        assert_eq!(parse(&input).array_rank(), Some(MAX_ARRAY_RANK));
    }

    #[test]
    fn test_with_default_assembly() {
        let name = parse("System.String").with_default_assembly("mscorlib");
        assert_eq!(name.assembly_qualified_name(), "System.String, mscorlib");
        let name = parse("A, Lib").with_default_assembly("mscorlib");
        assert_eq!(name.assembly_name(), Some("Lib"));
    }
}
