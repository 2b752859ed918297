use super::spec::InterfaceMethod;
use super::Error;
use crate::jvm::class_file::{ClassFile, ConstantsPool, Field};
use crate::jvm::code::FieldRef;
use crate::jvm::{BinaryName, FieldAccessFlags, FieldType, Name, RenderDescriptor, UnqualifiedName};

/// Static fields caching the interface `Class` and its reflective `Method`
///
/// Names are derived from the interface: `net.example.IHook` with method `run` gives
/// `CNET_EXAMPLE_IHOOK` and `CNET_EXAMPLE_IHOOK_RUN`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookFields {
    pub class_field: FieldRef,
    pub method_field: FieldRef,
}

impl HookFields {
    pub fn new(this_class: &BinaryName, interface: &InterfaceMethod) -> Result<HookFields, Error> {
        let class_name = format!(
            "C{}",
            interface.interface.to_dotted().to_uppercase().replace('.', "_")
        );
        let method_name = format!(
            "{}_{}",
            class_name,
            interface.name.as_str().to_uppercase()
        );

        let field = |name: String, class: BinaryName| -> Result<FieldRef, Error> {
            Ok(FieldRef::new(
                this_class.clone(),
                UnqualifiedName::from_string(name).map_err(Error::InvalidHookSpec)?,
                FieldType::object(class),
            ))
        };

        Ok(HookFields {
            class_field: field(class_name, BinaryName::CLASS)?,
            method_field: field(method_name, BinaryName::METHOD)?,
        })
    }

    /// Does the class already declare the class field (ie. has it been hooked before)?
    pub fn declared_by(&self, class_file: &ClassFile) -> Result<bool, Error> {
        for field in &class_file.fields {
            if field.name(&class_file.constants)? == self.class_field.name.as_str() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `private static final` declarations for both fields
    pub fn declarations(&self, constants: &mut ConstantsPool) -> Result<Vec<Field>, Error> {
        [&self.class_field, &self.method_field]
            .iter()
            .map(|field| -> Result<Field, Error> {
                Ok(Field {
                    access_flags: FieldAccessFlags::PRIVATE
                        | FieldAccessFlags::STATIC
                        | FieldAccessFlags::FINAL,
                    name_index: constants.get_utf8(field.name.as_str())?,
                    descriptor_index: constants.get_utf8(field.descriptor.render())?,
                    attributes: vec![],
                })
            })
            .collect()
    }
}
