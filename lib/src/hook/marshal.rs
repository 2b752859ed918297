//! Moving values between their own types and `Object`
//!
//! `Method.invoke` takes its arguments as an `Object[]` and returns an `Object`, so primitives
//! get boxed on the way in and unboxed on the way out.

use crate::jvm::code::{ConstantData, FieldRef, InvokeType, MethodRef, SymInstruction};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Wrapper class for a primitive type
pub fn boxed_class(base: BaseType) -> BinaryName {
    match base {
        BaseType::Boolean => BinaryName::BOOLEAN,
        BaseType::Byte => BinaryName::BYTE,
        BaseType::Char => BinaryName::CHARACTER,
        BaseType::Short => BinaryName::SHORT,
        BaseType::Int => BinaryName::INTEGER,
        BaseType::Long => BinaryName::LONG,
        BaseType::Float => BinaryName::FLOAT,
        BaseType::Double => BinaryName::DOUBLE,
    }
}

/// Accessor on the wrapper class which gets the primitive back out
pub fn unbox_method(base: BaseType) -> UnqualifiedName {
    match base {
        BaseType::Boolean => UnqualifiedName::BOOLEANVALUE,
        BaseType::Byte => UnqualifiedName::BYTEVALUE,
        BaseType::Char => UnqualifiedName::CHARVALUE,
        BaseType::Short => UnqualifiedName::SHORTVALUE,
        BaseType::Int => UnqualifiedName::INTVALUE,
        BaseType::Long => UnqualifiedName::LONGVALUE,
        BaseType::Float => UnqualifiedName::FLOATVALUE,
        BaseType::Double => UnqualifiedName::DOUBLEVALUE,
    }
}

/// How one value crosses the reflective call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueMarshal {
    /// Passed through as is
    Reference(RefType<BinaryName>),

    Primitive {
        base: BaseType,
        boxed: BinaryName,
        unbox: UnqualifiedName,
    },
}

impl ValueMarshal {
    pub fn new(field_type: &FieldType<BinaryName>) -> ValueMarshal {
        match field_type {
            FieldType::Ref(ref_type) => ValueMarshal::Reference(ref_type.clone()),
            FieldType::Base(base) => ValueMarshal::Primitive {
                base: *base,
                boxed: boxed_class(*base),
                unbox: unbox_method(*base),
            },
        }
    }

    /// Does the value take two stack slots?
    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            ValueMarshal::Primitive {
                base: BaseType::Long | BaseType::Double,
                ..
            }
        )
    }

    /// `valueOf` call that boxes a primitive (references need nothing)
    pub fn box_value(&self) -> Option<SymInstruction> {
        match self {
            ValueMarshal::Reference(_) => None,
            ValueMarshal::Primitive { base, boxed, .. } => Some(SymInstruction::Invoke(
                InvokeType::Static,
                MethodRef::new(
                    boxed.clone(),
                    UnqualifiedName::VALUEOF,
                    MethodDescriptor {
                        parameters: vec![FieldType::Base(*base)],
                        return_type: Some(FieldType::object(boxed.clone())),
                    },
                    false,
                ),
            )),
        }
    }

    /// Undo boxing of an `Object` on top of the stack
    pub fn unbox_value(&self) -> Vec<SymInstruction> {
        match self {
            ValueMarshal::Reference(RefType::Object(class)) if class == &BinaryName::OBJECT => {
                vec![]
            }
            ValueMarshal::Reference(ref_type) => vec![SymInstruction::CheckCast(ref_type.clone())],
            ValueMarshal::Primitive { base, boxed, unbox } => vec![
                SymInstruction::CheckCast(RefType::Object(boxed.clone())),
                SymInstruction::Invoke(
                    InvokeType::Virtual,
                    MethodRef::new(
                        boxed.clone(),
                        unbox.clone(),
                        MethodDescriptor {
                            parameters: vec![],
                            return_type: Some(FieldType::Base(*base)),
                        },
                        false,
                    ),
                ),
            ],
        }
    }

    /// Push the `Class` object for the type (`ldc` for references, `TYPE` for primitives)
    pub fn class_object(&self) -> SymInstruction {
        match self {
            ValueMarshal::Reference(ref_type) => {
                SymInstruction::Ldc(ConstantData::Class(ref_type.clone()))
            }
            ValueMarshal::Primitive { boxed, .. } => SymInstruction::GetStatic(FieldRef::new(
                boxed.clone(),
                UnqualifiedName::TYPE,
                FieldType::object(BinaryName::CLASS),
            )),
        }
    }
}

/// Marshaling for every parameter and the return value of the interface method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarshalingDescriptor {
    pub arguments: Vec<ValueMarshal>,

    /// `None` for `void`
    pub result: Option<ValueMarshal>,
}

impl MarshalingDescriptor {
    /// Panics if a parameter is a primitive array
    pub fn new(descriptor: &MethodDescriptor<BinaryName>) -> MarshalingDescriptor {
        let arguments = descriptor
            .parameters
            .iter()
            .map(|parameter| {
                if let FieldType::Ref(RefType::PrimitiveArray(_)) = parameter {
                    panic!(
                        "interface method parameter {:?} is a primitive array, which cannot be marshaled",
                        parameter
                    );
                }
                ValueMarshal::new(parameter)
            })
            .collect();
        MarshalingDescriptor {
            arguments,
            result: descriptor.return_type.as_ref().map(ValueMarshal::new),
        }
    }

    /// Turn the `Object` returned by `Method.invoke` into the declared return type
    pub fn unwrap_result(&self) -> Vec<SymInstruction> {
        match &self.result {
            None => vec![SymInstruction::Pop],
            Some(result) => result.unbox_value(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::parse_descriptor;

    fn marshaling(descriptor: &str) -> MarshalingDescriptor {
        MarshalingDescriptor::new(&parse_descriptor(descriptor).unwrap())
    }

    #[test]
    fn boxing_pairs() {
        assert_eq!(boxed_class(BaseType::Char), BinaryName::CHARACTER);
        assert_eq!(unbox_method(BaseType::Char), UnqualifiedName::CHARVALUE);
        assert_eq!(boxed_class(BaseType::Boolean), BinaryName::BOOLEAN);
        assert_eq!(unbox_method(BaseType::Long), UnqualifiedName::LONGVALUE);
    }

    #[test]
    fn arguments() {
        let descriptor = marshaling("(JLjava/lang/String;D[Ljava/lang/Object;)V");
        let wide: Vec<bool> = descriptor.arguments.iter().map(|a| a.is_wide()).collect();
        assert_eq!(wide, vec![true, false, true, false]);

        assert!(descriptor.arguments[1].box_value().is_none());
        match descriptor.arguments[0].box_value() {
            Some(SymInstruction::Invoke(InvokeType::Static, method)) => {
                assert_eq!(method.class, RefType::Object(BinaryName::LONG));
                assert_eq!(method.name, UnqualifiedName::VALUEOF);
                assert_eq!(method.descriptor, parse_descriptor("(J)Ljava/lang/Long;").unwrap());
            }
            other => panic!("unexpected boxing {:?}", other),
        }

        match descriptor.arguments[2].class_object() {
            SymInstruction::GetStatic(field) => {
                assert_eq!(field.class, BinaryName::DOUBLE);
                assert_eq!(field.name, UnqualifiedName::TYPE);
            }
            other => panic!("unexpected class object {:?}", other),
        }
        assert_eq!(
            descriptor.arguments[3].class_object(),
            SymInstruction::Ldc(ConstantData::Class(
                parse_descriptor("[Ljava/lang/Object;").unwrap()
            ))
        );
    }

    #[test]
    fn results() {
        assert_eq!(marshaling("()V").unwrap_result(), vec![SymInstruction::Pop]);
        assert_eq!(marshaling("()Ljava/lang/Object;").unwrap_result(), vec![]);
        assert_eq!(
            marshaling("()[Lapp/Chunk;").unwrap_result(),
            vec![SymInstruction::CheckCast(
                parse_descriptor("[Lapp/Chunk;").unwrap()
            )]
        );

        let unboxed = marshaling("()Z").unwrap_result();
        assert_eq!(unboxed.len(), 2);
        assert_eq!(
            unboxed[0],
            SymInstruction::CheckCast(RefType::Object(BinaryName::BOOLEAN))
        );
        assert!(matches!(
            &unboxed[1],
            SymInstruction::Invoke(InvokeType::Virtual, method)
                if method.name == UnqualifiedName::BOOLEANVALUE
        ));
    }

    #[test]
    #[should_panic(expected = "primitive array")]
    fn primitive_arrays_are_rejected() {
        marshaling("([B)V");
    }
}
