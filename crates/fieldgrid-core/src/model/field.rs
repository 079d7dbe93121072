//! Module: model::field
//! Responsibility: field descriptors and their read/write accessors.
//! Does not own: predicate/order SQL (implemented beside the compiler in
//! `query::compile`), or the catalog that hands descriptors out.

use crate::{
    model::{FieldError, module::ModuleDescriptor, record::Record},
    value::{DataType, Value},
};

///
/// NativeFieldModel
///
/// Static declaration of a field backed by a real column.
///

#[derive(Debug, Eq, PartialEq)]
pub struct NativeFieldModel {
    pub uid: &'static str,
    pub module: &'static ModuleDescriptor,
    pub label: &'static str,
    pub column: &'static str,
    pub data_type: DataType,
    /// Decimal fields only: fractional digits kept on write (truncating).
    pub decimal_scale: Option<u32>,
}

impl NativeFieldModel {
    #[must_use]
    pub const fn new(
        uid: &'static str,
        module: &'static ModuleDescriptor,
        label: &'static str,
        column: &'static str,
        data_type: DataType,
    ) -> Self {
        Self {
            uid,
            module,
            label,
            column,
            data_type,
            decimal_scale: None,
        }
    }

    #[must_use]
    pub const fn with_scale(mut self, scale: u32) -> Self {
        self.decimal_scale = Some(scale);
        self
    }
}

///
/// FieldAccess
///
/// How a field is physically reached.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldAccess {
    Native(NativeField),
    Custom(CustomField),
}

///
/// NativeField
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativeField {
    pub column: &'static str,
}

///
/// CustomField
///
/// A value row in `custom_values`, scoped by the owning module's name and the
/// definition id.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomField {
    pub definition_id: i64,
    pub value_column: &'static str,
}

///
/// FieldDescriptor
///
/// One addressable attribute of a module. Native descriptors come from
/// static declarations; custom descriptors are rebuilt from definitions on
/// every catalog refresh.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub uid: String,
    pub module: &'static ModuleDescriptor,
    /// Default label; an external label source may override it.
    pub label: String,
    pub data_type: DataType,
    pub decimal_scale: Option<u32>,
    pub access: FieldAccess,
    /// Display order among custom fields; natives keep declaration order.
    pub rank: i64,
}

impl FieldDescriptor {
    #[must_use]
    pub fn native(model: &NativeFieldModel) -> Self {
        Self {
            uid: model.uid.to_string(),
            module: model.module,
            label: model.label.to_string(),
            data_type: model.data_type,
            decimal_scale: model.decimal_scale,
            access: FieldAccess::Native(NativeField {
                column: model.column,
            }),
            rank: 0,
        }
    }

    #[must_use]
    pub fn custom(
        uid: String,
        module: &'static ModuleDescriptor,
        label: String,
        data_type: DataType,
        definition_id: i64,
        rank: i64,
    ) -> Self {
        Self {
            uid,
            module,
            label,
            data_type,
            decimal_scale: None,
            access: FieldAccess::Custom(CustomField {
                definition_id,
                value_column: data_type.value_column(),
            }),
            rank,
        }
    }

    #[must_use]
    pub const fn is_custom(&self) -> bool {
        matches!(self.access, FieldAccess::Custom(_))
    }

    /// Coerce a value into this field's type.
    pub fn coerce(&self, input: &Value) -> Result<Value, FieldError> {
        input
            .coerce(self.data_type, self.decimal_scale)
            .map_err(|err| self.type_mismatch(err.value))
    }

    /// Coerce a raw literal into this field's type.
    pub fn parse(&self, literal: &str) -> Result<Value, FieldError> {
        Value::parse(literal, self.data_type, self.decimal_scale)
            .map_err(|err| self.type_mismatch(err.value))
    }

    /// Read this field from a record of the owning module.
    pub fn read(&self, record: &Record) -> Result<Value, FieldError> {
        self.check_owner(record)?;

        match &self.access {
            FieldAccess::Native(native) => match record.column(native.column) {
                None => Ok(Value::Null),
                Some(raw) => Value::from_sql_value(raw, self.data_type)
                    .map_err(|err| self.type_mismatch(err.value)),
            },
            FieldAccess::Custom(custom) => Ok(record
                .custom_value(custom.definition_id)
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }

    /// Coerce and stage a write on the record. Nothing touches storage until
    /// the record is saved.
    pub fn write(&self, record: &mut Record, input: &Value) -> Result<(), FieldError> {
        self.check_owner(record)?;
        let value = self.coerce(input)?;

        match &self.access {
            FieldAccess::Native(native) => record.set_column(native.column, value.to_sql_value()),
            FieldAccess::Custom(custom) => record.stage_custom(custom.definition_id, value),
        }

        Ok(())
    }

    pub(crate) fn type_mismatch(&self, value: impl Into<String>) -> FieldError {
        FieldError::TypeMismatch {
            field: self.uid.clone(),
            value: value.into(),
            expected: self.data_type,
        }
    }

    fn check_owner(&self, record: &Record) -> Result<(), FieldError> {
        if record.module().name == self.module.name {
            Ok(())
        } else {
            Err(FieldError::UnknownFieldId {
                module: record.module().name.to_string(),
                field: self.uid.clone(),
            })
        }
    }
}
