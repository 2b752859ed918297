//! Field and method descriptors (`[Ljava/lang/String;`, `(JI)V`)

use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

type Source<'a> = Peekable<Chars<'a>>;

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::new(ErrorKind::InvalidInput, msg.into()))
}

fn truncated<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::new(ErrorKind::UnexpectedEof, msg.into()))
}

/// Types that have a descriptor string
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut rendered = String::new();
        self.render_to(&mut rendered);
        rendered
    }

    fn render_to(&self, write_to: &mut String);
}

/// Types that can be read back from their descriptor string
pub trait ParseDescriptor: Sized {
    /// Parse a complete descriptor, rejecting trailing characters
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let parsed = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(parsed),
            Some(c) => invalid(format!("Trailing '{}' after descriptor", c)),
        }
    }

    fn parse_from(source: &mut Source) -> Result<Self>;
}

/// Parse a descriptor, reporting failures as class file errors
pub fn parse_descriptor<T: ParseDescriptor>(source: &str) -> std::result::Result<T, super::Error> {
    T::parse(source).map_err(|err| super::Error::BadDescriptor(format!("{:?}: {}", source, err)))
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

const BASE_TYPE_CHARS: [(BaseType, char); 8] = [
    (BaseType::Byte, 'B'),
    (BaseType::Char, 'C'),
    (BaseType::Double, 'D'),
    (BaseType::Float, 'F'),
    (BaseType::Int, 'I'),
    (BaseType::Long, 'J'),
    (BaseType::Short, 'S'),
    (BaseType::Boolean, 'Z'),
];

impl BaseType {
    fn from_char(c: char) -> Option<BaseType> {
        BASE_TYPE_CHARS
            .iter()
            .find(|(_, known)| *known == c)
            .map(|(base, _)| *base)
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        if let Some((_, c)) = BASE_TYPE_CHARS.iter().find(|(base, _)| base == self) {
            write_to.push(*c);
        }
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Source) -> Result<Self> {
        match source.next() {
            Some(c) => match BaseType::from_char(c) {
                Some(base) => Ok(base),
                None => invalid(format!("'{}' is not a primitive type", c)),
            },
            None => truncated("Expected a primitive type"),
        }
    }
}

/// Reference type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array whose innermost elements are `T`
///
/// `additional_dimensions` counts the brackets beyond the first, so `[[I` has 1.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    pub additional_dimensions: usize,
    pub element_type: T,
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        write_to.extend(std::iter::repeat('[').take(self.additional_dimensions + 1));
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Source) -> Result<Self> {
        if source.next() != Some('L') {
            return invalid("Class types start with 'L'");
        }
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => break,
                Some(c) => class_name.push(c),
                None => return truncated(format!("Unterminated class type 'L{}'", class_name)),
            }
        }
        BinaryName::from_string(class_name).map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(write_to),
            RefType::ObjectArray(array) => array.render_to(write_to),
            RefType::PrimitiveArray(array) => array.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Source) -> Result<Self> {
        let mut dimensions = 0;
        while source.peek() == Some(&'[') {
            source.next();
            dimensions += 1;
        }

        let is_class = source.peek() == Some(&'L');
        if dimensions == 0 {
            return match source.peek() {
                Some('L') => C::parse_from(source).map(RefType::Object),
                Some(c) => invalid(format!("'{}' does not start a reference type", c)),
                None => truncated("Expected a reference type"),
            };
        }

        let additional_dimensions = dimensions - 1;
        Ok(if is_class {
            RefType::ObjectArray(ArrayType {
                additional_dimensions,
                element_type: C::parse_from(source)?,
            })
        } else {
            RefType::PrimitiveArray(ArrayType {
                additional_dimensions,
                element_type: BaseType::parse_from(source)?,
            })
        })
    }
}

impl<C> RefType<C> {
    /// Array type with the given elements
    pub fn array(field_type: FieldType<C>) -> RefType<C> {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(inner)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: inner.additional_dimensions + 1,
                element_type: inner.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(inner)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: inner.additional_dimensions + 1,
                element_type: inner.element_type,
            }),
        }
    }
}

impl<C: Clone> RefType<C> {
    /// Type of the elements of an array type (`None` if this is not an array)
    pub fn element_type(&self) -> Option<FieldType<C>> {
        Some(match self {
            RefType::Object(_) => return None,
            RefType::PrimitiveArray(array) => match array.additional_dimensions {
                0 => FieldType::Base(array.element_type),
                n => FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: array.element_type,
                })),
            },
            RefType::ObjectArray(array) => match array.additional_dimensions {
                0 => FieldType::object(array.element_type.clone()),
                n => FieldType::Ref(RefType::ObjectArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: array.element_type.clone(),
                })),
            },
        })
    }
}

impl RefType<BinaryName> {
    /// Interpret the name stored in a `CONSTANT_Class` entry
    ///
    /// These are binary names for classes and interfaces, but full descriptors for array types.
    pub fn from_class_name(name: &str) -> Result<RefType<BinaryName>> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_string(name.to_owned())
                .map(RefType::Object)
                .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
        }
    }

    /// Render the name stored in a `CONSTANT_Class` entry
    pub fn to_class_name(&self) -> String {
        match self {
            RefType::Object(name) => name.as_str().to_owned(),
            other => other.render(),
        }
    }
}

/// Type of a field, local, or stack value
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(field_type: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(ref_type) => ref_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Source) -> Result<Self> {
        match source.peek() {
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(_) => BaseType::parse_from(source).map(FieldType::Base),
            None => truncated("Expected a field type"),
        }
    }
}

/// Parameter and return types of a method (`None` returns `void`)
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Local variable slots taken by the parameters, plus one for `this`
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let parameters: usize = self.parameters.iter().map(Width::width).sum();
        parameters + usize::from(has_this_param)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(return_type) => return_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Source) -> Result<Self> {
        if source.next() != Some('(') {
            return invalid("Method descriptors start with '('");
        }

        let mut parameters = vec![];
        loop {
            match source.peek() {
                Some(')') => {
                    source.next();
                    break;
                }
                Some(_) => parameters.push(FieldType::parse_from(source)?),
                None => return truncated("Unterminated parameter list"),
            }
        }

        let return_type = if source.peek() == Some(&'V') {
            source.next();
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
