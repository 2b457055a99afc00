//! The tagged value carried between operators.
//!
//! INT32/INT64/FP64 values are inline; VARCHAR values carry only the
//! packed reference until finalization, which keeps string copies off
//! the join path and turns same-column string equality into 64-bit
//! equality.

use core_pages::{DataType, StringRef};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaggedValue {
    Null,
    I32(i32),
    I64(i64),
    F64(f64),
    Str(StringRef),
}

impl TaggedValue {
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, TaggedValue::Null)
    }

    #[inline]
    pub fn as_i32(self) -> Option<i32> {
        match self {
            TaggedValue::I32(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str_ref(self) -> Option<StringRef> {
        match self {
            TaggedValue::Str(r) => Some(r),
            _ => None,
        }
    }

    /// The carried type; `None` for null.
    pub fn data_type(self) -> Option<DataType> {
        match self {
            TaggedValue::Null => None,
            TaggedValue::I32(_) => Some(DataType::Int32),
            TaggedValue::I64(_) => Some(DataType::Int64),
            TaggedValue::F64(_) => Some(DataType::Float64),
            TaggedValue::Str(_) => Some(DataType::Varchar),
        }
    }
}
