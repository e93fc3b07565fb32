#![forbid(unsafe_code)]

use std::fmt;

/// Struct tag as declared in the layout table.
pub type Tag = String;

/// Struct member name.
pub type Member = String;

/// Value types shared by computational and logical variables.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseType {
    Unit,
    Bool,
    Integer,
    Pointer,
    Struct(Tag),
    List(Box<BaseType>),
    Tuple(Vec<BaseType>),
    /// Integer-indexed mapping, used for array contents.
    Map(Box<BaseType>),
    /// User datatype, opaque to the checker.
    Datatype(String),
}

/// Logical sorts wrap base types one-to-one.
pub type Sort = BaseType;

impl BaseType {
    pub fn list(elem: BaseType) -> Self {
        BaseType::List(Box::new(elem))
    }

    pub fn map(elem: BaseType) -> Self {
        BaseType::Map(Box::new(elem))
    }

    pub fn list_element(&self) -> Option<&BaseType> {
        match self {
            BaseType::List(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn map_element(&self) -> Option<&BaseType> {
        match self {
            BaseType::Map(elem) => Some(elem),
            _ => None,
        }
    }

    /// Integers and pointers both live in the arithmetic fragment.
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Pointer)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Unit => write!(f, "unit"),
            BaseType::Bool => write!(f, "bool"),
            BaseType::Integer => write!(f, "integer"),
            BaseType::Pointer => write!(f, "pointer"),
            BaseType::Struct(tag) => write!(f, "struct {tag}"),
            BaseType::List(elem) => write!(f, "list<{elem}>"),
            BaseType::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({items})")
            }
            BaseType::Map(elem) => write!(f, "map<integer, {elem}>"),
            BaseType::Datatype(name) => write!(f, "datatype {name}"),
        }
    }
}
