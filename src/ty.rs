use std::fmt;

/// Types tracked by the type checker. There is no subtyping: `cast(ptr)` is
/// the only way to turn one type into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
  Int,
  Bool,
  Ptr,
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DataType::Int => f.write_str("INT"),
      DataType::Bool => f.write_str("BOOL"),
      DataType::Ptr => f.write_str("PTR"),
    }
  }
}

/// A sequence of types, bottom of the stack first, printed as `[INT, PTR]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSeq(pub Vec<DataType>);

impl fmt::Display for TypeSeq {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;
    for (i, ty) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{ty}")?;
    }
    f.write_str("]")
  }
}

impl FromIterator<DataType> for TypeSeq {
  fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_like_a_list() {
    assert_eq!(TypeSeq::default().to_string(), "[]");
    let seq: TypeSeq = [DataType::Int, DataType::Bool, DataType::Ptr].into_iter().collect();
    assert_eq!(seq.to_string(), "[INT, BOOL, PTR]");
  }
}
