//! Finalization: turn the root column buffer into an external columnar
//! table in the engine's page format.
//!
//! Fixed-width columns copy values into pages with validity bitmaps;
//! VARCHAR columns materialize every packed reference through the
//! resolver, long strings spilling into starter + continuation chains.

use core_columns::{ColumnBuffer, TaggedValue};
use core_pages::{
    ColumnarTable, DataType, FixedColumnWriter, StringResolver, VarcharColumnWriter,
};
use core_plan::{EngineError, OutputAttr, Plan};

pub fn finalize(
    plan: &Plan,
    buffer: &ColumnBuffer<'_>,
    output_attrs: &[OutputAttr],
) -> Result<ColumnarTable, EngineError> {
    let resolver = StringResolver::new(&plan.inputs);
    let mut columns = Vec::with_capacity(output_attrs.len());

    for (col_idx, attr) in output_attrs.iter().enumerate() {
        let view = &buffer.columns[col_idx];
        let column = match attr.data_type {
            DataType::Int32 => {
                let mut writer = FixedColumnWriter::<i32>::new();
                for value in view.iter() {
                    match value {
                        TaggedValue::Null => writer.push(None),
                        TaggedValue::I32(v) => writer.push(Some(v)),
                        _ => {
                            return Err(EngineError::InvariantViolation(
                                "non-i32 value in an I32 output column",
                            ))
                        }
                    }
                }
                writer.finish()
            }
            DataType::Int64 => {
                let mut writer = FixedColumnWriter::<i64>::new();
                for value in view.iter() {
                    match value {
                        TaggedValue::Null => writer.push(None),
                        TaggedValue::I64(v) => writer.push(Some(v)),
                        _ => {
                            return Err(EngineError::InvariantViolation(
                                "non-i64 value in an I64 output column",
                            ))
                        }
                    }
                }
                writer.finish()
            }
            DataType::Float64 => {
                let mut writer = FixedColumnWriter::<f64>::new();
                for value in view.iter() {
                    match value {
                        TaggedValue::Null => writer.push(None),
                        TaggedValue::F64(v) => writer.push(Some(v)),
                        _ => {
                            return Err(EngineError::InvariantViolation(
                                "non-f64 value in an F64 output column",
                            ))
                        }
                    }
                }
                writer.finish()
            }
            DataType::Varchar => {
                let mut writer = VarcharColumnWriter::new();
                let mut scratch = Vec::new();
                for value in view.iter() {
                    match value {
                        TaggedValue::Null => writer.push(None),
                        TaggedValue::Str(r) if r.is_null() => writer.push(None),
                        TaggedValue::Str(r) => {
                            let bytes = resolver.resolve(r, &mut scratch)?;
                            writer.push(Some(bytes));
                        }
                        _ => {
                            return Err(EngineError::InvariantViolation(
                                "non-string value in a VARCHAR output column",
                            ))
                        }
                    }
                }
                writer.finish()
            }
        };
        columns.push(column);
    }

    Ok(ColumnarTable::new(buffer.num_rows, columns))
}
