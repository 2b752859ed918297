//! Code fragments making up a hook
//!
//! A hook site looks like this, where `load` is whatever pushes the object being tested:
//!
//! ```text
//! load
//! <prologue>        // skip to `skip` unless the object implements the interface
//! load
//! <arguments>       // pushed by the patcher
//! <interface call>  // interface method result is now on the stack
//! ...               // use the result (return it, store it, ...)
//! skip:             // <epilogue>
//! ```

use super::fields::HookFields;
use super::marshal::MarshalingDescriptor;
use super::spec::InterfaceMethod;
use crate::jvm::code::{
    BranchInstruction, CodeItem, ConstantData, InvokeType, MethodRef, OrdComparison,
    SymInstruction, SynLabel,
};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Emits hook fragments for one interface method
#[derive(Clone, Debug)]
pub struct HookEmitter {
    pub fields: HookFields,
    pub marshaling: MarshalingDescriptor,
}

impl HookEmitter {
    pub fn new(fields: HookFields, interface: &InterfaceMethod) -> HookEmitter {
        HookEmitter {
            fields,
            marshaling: MarshalingDescriptor::new(&interface.descriptor),
        }
    }

    /// Consume the object on top of the stack and jump to `skip` if it doesn't implement the
    /// interface
    pub fn prologue(&self, skip: SynLabel) -> Vec<CodeItem> {
        vec![
            CodeItem::Instruction(SymInstruction::GetStatic(self.fields.class_field.clone())),
            CodeItem::Instruction(SymInstruction::Swap),
            CodeItem::Instruction(SymInstruction::Invoke(
                InvokeType::Virtual,
                MethodRef::new(
                    BinaryName::CLASS,
                    UnqualifiedName::ISINSTANCE,
                    MethodDescriptor {
                        parameters: vec![FieldType::object(BinaryName::OBJECT)],
                        return_type: Some(FieldType::boolean()),
                    },
                    false,
                ),
            )),
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, skip)),
        ]
    }

    /// Call the interface method on the object below the arguments, leaving its result
    ///
    /// The arguments are packed into an `Object[]` back to front: each one gets threaded under
    /// the array, boxed, and stored at its index.
    pub fn interface_call(&self) -> Vec<CodeItem> {
        let mut code = vec![
            load_int(self.marshaling.arguments.len()),
            SymInstruction::ANewArray(RefType::Object(BinaryName::OBJECT)),
        ];

        for (index, argument) in self.marshaling.arguments.iter().enumerate().rev() {
            let dup = if argument.is_wide() {
                SymInstruction::DupX2
            } else {
                SymInstruction::DupX1
            };
            code.push(dup.clone());
            code.push(dup);
            code.push(SymInstruction::Pop);
            code.extend(argument.box_value());
            code.push(load_int(index));
            code.push(SymInstruction::Swap);
            code.push(SymInstruction::AAStore);
        }

        code.push(SymInstruction::GetStatic(self.fields.method_field.clone()));
        code.push(SymInstruction::DupX2);
        code.push(SymInstruction::Pop);
        code.push(SymInstruction::Invoke(InvokeType::Virtual, method_invoke()));
        code.extend(self.marshaling.unwrap_result());

        code.into_iter().map(CodeItem::Instruction).collect()
    }

    /// Place the label the prologue jumps to
    pub fn epilogue(&self, skip: SynLabel) -> Vec<CodeItem> {
        vec![CodeItem::Label(skip)]
    }
}

/// `java/lang/reflect/Method.invoke(Object, Object[])`
fn method_invoke() -> MethodRef {
    MethodRef::new(
        BinaryName::METHOD,
        UnqualifiedName::INVOKE,
        MethodDescriptor {
            parameters: vec![
                FieldType::object(BinaryName::OBJECT),
                FieldType::array(FieldType::object(BinaryName::OBJECT)),
            ],
            return_type: Some(FieldType::object(BinaryName::OBJECT)),
        },
        false,
    )
}

/// Push a non-negative integer constant using the shortest instruction
pub fn load_int(value: usize) -> SymInstruction {
    match value {
        0 => SymInstruction::IConst0,
        1 => SymInstruction::IConst1,
        2 => SymInstruction::IConst2,
        3 => SymInstruction::IConst3,
        4 => SymInstruction::IConst4,
        5 => SymInstruction::IConst5,
        6..=127 => SymInstruction::BiPush(value as i8),
        128..=255 => SymInstruction::SiPush(value as i16),
        _ => SymInstruction::Ldc(ConstantData::Integer(value as i32)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::FieldRef;
    use crate::jvm::{parse_descriptor, Name};

    fn emitter(descriptor: &str) -> HookEmitter {
        let this_class = BinaryName::from_string(String::from("app/Target")).unwrap();
        let interface = InterfaceMethod {
            interface: BinaryName::from_dotted("app.IHook").unwrap(),
            name: UnqualifiedName::from_string(String::from("hook")).unwrap(),
            descriptor: parse_descriptor(descriptor).unwrap(),
        };
        HookEmitter::new(HookFields::new(&this_class, &interface).unwrap(), &interface)
    }

    fn instructions(items: Vec<CodeItem>) -> Vec<SymInstruction> {
        items
            .into_iter()
            .map(|item| match item {
                CodeItem::Instruction(insn) => insn,
                other => panic!("unexpected item {:?}", other),
            })
            .collect()
    }

    fn get_static(field: &FieldRef) -> SymInstruction {
        SymInstruction::GetStatic(field.clone())
    }

    #[test]
    fn integer_constants() {
        assert_eq!(load_int(0), SymInstruction::IConst0);
        assert_eq!(load_int(5), SymInstruction::IConst5);
        assert_eq!(load_int(6), SymInstruction::BiPush(6));
        assert_eq!(load_int(127), SymInstruction::BiPush(127));
        assert_eq!(load_int(128), SymInstruction::SiPush(128));
        assert_eq!(load_int(255), SymInstruction::SiPush(255));
        assert_eq!(
            load_int(256),
            SymInstruction::Ldc(ConstantData::Integer(256))
        );
    }

    #[test]
    fn prologue_and_epilogue_share_the_label() {
        let emitter = emitter("()Z");
        let skip = SynLabel::default().next();
        let prologue = emitter.prologue(skip);
        assert_eq!(prologue.len(), 4);
        assert_eq!(
            prologue[0],
            CodeItem::Instruction(get_static(&emitter.fields.class_field))
        );
        assert_eq!(prologue[1], CodeItem::Instruction(SymInstruction::Swap));
        assert_eq!(
            prologue[3],
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, skip))
        );
        assert_eq!(emitter.epilogue(skip), vec![CodeItem::Label(skip)]);
    }

    #[test]
    fn no_arguments() {
        let emitter = emitter("()Ljava/lang/Object;");
        assert_eq!(
            instructions(emitter.interface_call()),
            vec![
                SymInstruction::IConst0,
                SymInstruction::ANewArray(RefType::Object(BinaryName::OBJECT)),
                get_static(&emitter.fields.method_field),
                SymInstruction::DupX2,
                SymInstruction::Pop,
                SymInstruction::Invoke(InvokeType::Virtual, method_invoke()),
            ]
        );
    }

    #[test]
    fn wide_and_reference_arguments() {
        let emitter = emitter("(JLjava/lang/String;)V");
        let boxed_long = emitter.marshaling.arguments[0].box_value().unwrap();
        assert_eq!(
            instructions(emitter.interface_call()),
            vec![
                SymInstruction::IConst2,
                SymInstruction::ANewArray(RefType::Object(BinaryName::OBJECT)),
                // the string, which sits just under the array
                SymInstruction::DupX1,
                SymInstruction::DupX1,
                SymInstruction::Pop,
                SymInstruction::IConst1,
                SymInstruction::Swap,
                SymInstruction::AAStore,
                // the long, which takes two slots
                SymInstruction::DupX2,
                SymInstruction::DupX2,
                SymInstruction::Pop,
                boxed_long,
                SymInstruction::IConst0,
                SymInstruction::Swap,
                SymInstruction::AAStore,
                get_static(&emitter.fields.method_field),
                SymInstruction::DupX2,
                SymInstruction::Pop,
                SymInstruction::Invoke(InvokeType::Virtual, method_invoke()),
                SymInstruction::Pop,
            ]
        );
    }

    #[test]
    fn primitive_results_are_unboxed() {
        let emitter = emitter("()I");
        let code = instructions(emitter.interface_call());
        assert_eq!(
            code[code.len() - 2],
            SymInstruction::CheckCast(RefType::Object(BinaryName::INTEGER))
        );
        assert!(matches!(
            &code[code.len() - 1],
            SymInstruction::Invoke(InvokeType::Virtual, method)
                if method.name == UnqualifiedName::INTVALUE
                    && method.descriptor == parse_descriptor("()I").unwrap()
        ));
    }
}
