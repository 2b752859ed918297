use super::*;
use crate::jvm::class_file::{ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, StackMapFrame};
use crate::jvm::code::{BranchInstruction, ConstantData, Instruction, InvokeType, SymInstruction};
use crate::jvm::{
    ArrayType, BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName,
    VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables, indexed by slot
    ///
    /// The slot after a `long` or `double` always holds `Top`.
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame tracked while inferring frames
pub type VFrame = Frame<RefType<BinaryName>, usize>;

impl VFrame {
    /// Frame on entry to a method
    ///
    /// In a constructor, `this` starts off uninitialized (except in `java/lang/Object`, which has
    /// no superclass constructor to call).
    pub fn initial(
        this_class: &BinaryName,
        method_name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        is_static: bool,
    ) -> VFrame {
        let mut locals = vec![];
        if !is_static {
            if *method_name == UnqualifiedName::INIT && *this_class != BinaryName::OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VType::object(this_class.clone()));
            }
        }
        for parameter in &descriptor.parameters {
            let vtype = VType::from(parameter.clone());
            let is_wide = vtype.width() == 2;
            locals.push(vtype);
            if is_wide {
                locals.push(VerificationType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Number of stack slots in use
    pub fn stack_depth(&self) -> usize {
        self.stack.offset_len().0
    }

    /// Update the frame to reflect the effects of a (non-branching) instruction
    ///
    /// `item` is the position of the instruction in the method body. It identifies the value
    /// pushed by a `new`.
    pub fn execute(
        &mut self,
        item: usize,
        insn: &SymInstruction,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        execute_instruction(self, item, insn, this_class)
    }

    /// Update the frame to reflect the effects of a branching instruction
    pub fn execute_branch<Lbl>(
        &mut self,
        insn: &BranchInstruction<Lbl>,
        return_type: &Option<FieldType<BinaryName>>,
    ) -> Result<(), VerifierErrorKind> {
        execute_branch_instruction(self, insn, return_type)
    }

    /// Resolve the frame into the form used in a `StackMapTable`
    ///
    /// `item_offset` maps the position of a `new` instruction to its bytecode offset.
    pub fn into_compact(
        &self,
        constants_pool: &mut ConstantsPool,
        item_offset: impl Fn(usize) -> u16,
    ) -> Result<CompactFrame, ConstantPoolOverflow> {
        let mut locals = vec![];
        let mut slot = 0;
        while let Some(local) = self.locals.get(slot) {
            locals.push(local.into_serializable(constants_pool, &item_offset)?);
            slot += local.width();
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }

        let stack = self
            .stack
            .iter()
            .map(|(_, _, t)| t.into_serializable(constants_pool, &item_offset))
            .collect::<Result<_, _>>()?;

        Ok(CompactFrame { locals, stack })
    }
}

/// Frame in the form it takes in a `StackMapTable`: `long` and `double` locals take up a single
/// entry and trailing `Top` locals are dropped
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompactFrame {
    pub locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    pub stack: Vec<VerificationType<ClassConstantIndex, u16>>,
}

impl CompactFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_len = self.locals.len();
        let prev_len = previous_frame.locals.len();
        let common_prefix = self
            .locals
            .iter()
            .zip(&previous_frame.locals)
            .take_while(|(t1, t2)| t1 == t2)
            .count();

        match self.stack.len() {
            0 if common_prefix == this_len && this_len == prev_len => {
                StackMapFrame::SameLocalsNoStack { offset_delta }
            }
            0 if common_prefix == this_len && prev_len - this_len < 4 => {
                StackMapFrame::ChopLocalsNoStack {
                    offset_delta,
                    chopped_k: (prev_len - this_len) as u8,
                }
            }
            0 if common_prefix == prev_len && this_len - prev_len < 4 => {
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals: self.locals[prev_len..].to_vec(),
                }
            }
            1 if self.locals == previous_frame.locals => StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack: self.stack[0],
            },
            _ => self.full_stack_map_frame(offset_delta),
        }
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.locals.clone(),
        }
    }
}

fn execute_instruction(
    frame: &mut VFrame,
    item: usize,
    insn: &SymInstruction,
    this_class: &BinaryName,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let Frame {
        ref mut stack,
        ref mut locals,
    } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(constant) | Ldc2(constant) => {
            let expected_width = if matches!(insn, Ldc2(_)) { 2 } else { 1 };
            let typ = match constant {
                ConstantData::String(_) => VType::object(BinaryName::STRING),
                ConstantData::Class(_) => VType::object(BinaryName::CLASS),
                ConstantData::Integer(_) => Integer,
                ConstantData::Float(_) => Float,
                ConstantData::Long(_) => Long,
                ConstantData::Double(_) => Double,
                ConstantData::MethodHandle(_) => VType::object(BinaryName::METHODHANDLE),
                ConstantData::MethodType(_) => VType::object(BinaryName::METHODTYPE),
                ConstantData::Dynamic(_, field_type) => VType::from(field_type.clone()),
            };
            if typ.width() != expected_width {
                return Err(VerifierErrorKind::InvalidWidth(typ.width()));
            }
            stack.push(typ);
        }

        ILoad(index) => {
            get_local_expecting(locals, *index, &Integer)?;
            stack.push(Integer);
        }
        LLoad(index) => {
            get_local_expecting(locals, *index, &Long)?;
            stack.push(Long);
        }
        FLoad(index) => {
            get_local_expecting(locals, *index, &Float)?;
            stack.push(Float);
        }
        DLoad(index) => {
            get_local_expecting(locals, *index, &Double)?;
            stack.push(Double);
        }
        ALoad(index) => {
            let typ = get_local(locals, *index)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            stack.push(typ);
        }

        IALoad | BALoad | CALoad | SALoad => {
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
            stack.push(Integer);
        }
        LALoad => {
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
            stack.push(Long);
        }
        FALoad => {
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
            stack.push(Float);
        }
        DALoad => {
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
            stack.push(Double);
        }
        AALoad => {
            pop_expecting(stack, &Integer)?;
            match pop_array(stack)? {
                Object(RefType::ObjectArray(arr)) => match arr.additional_dimensions {
                    0 => stack.push(Object(RefType::Object(arr.element_type))),
                    n => stack.push(Object(RefType::ObjectArray(ArrayType {
                        additional_dimensions: n - 1,
                        ..arr
                    }))),
                },
                Object(RefType::PrimitiveArray(arr)) if arr.additional_dimensions > 0 => {
                    stack.push(Object(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions: arr.additional_dimensions - 1,
                        ..arr
                    })))
                }
                Null => stack.push(Null),
                _ => return Err(VerifierErrorKind::NotArrayType),
            };
        }

        IStore(index) => {
            pop_expecting(stack, &Integer)?;
            set_local(locals, *index, Integer);
        }
        FStore(index) => {
            pop_expecting(stack, &Float)?;
            set_local(locals, *index, Float);
        }
        LStore(index) => {
            pop_expecting(stack, &Long)?;
            set_local(locals, *index, Long);
        }
        DStore(index) => {
            pop_expecting(stack, &Double)?;
            set_local(locals, *index, Double);
        }
        AStore(index) => {
            let typ = pop_reference(stack)?;
            set_local(locals, *index, typ);
        }

        IAStore | BAStore | CAStore | SAStore => {
            pop_expecting(stack, &Integer)?;
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
        }
        LAStore => {
            pop_expecting(stack, &Long)?;
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
        }
        FAStore => {
            pop_expecting(stack, &Float)?;
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
        }
        DAStore => {
            pop_expecting(stack, &Double)?;
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
        }
        AAStore => {
            pop_reference(stack)?;
            pop_expecting(stack, &Integer)?;
            pop_array(stack)?;
        }

        Pop => {
            pop_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_expecting_width(stack, 1)?;
                }

                // Form 2
                _ => (),
            }
        }

        Dup => {
            let arg1 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        Dup2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }
            }
        }

        Dup2X1 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        Dup2X2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        _ => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }

                _ => {
                    let arg2 = pop(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        _ => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }
            }
        }

        Swap => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            pop_expecting(stack, &Integer)?;
            pop_expecting(stack, &Integer)?;
            stack.push(Integer);
        }

        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
            pop_expecting(stack, &Long)?;
            pop_expecting(stack, &Long)?;
            stack.push(Long);
        }

        FAdd | FSub | FDiv | FMul | FRem => {
            pop_expecting(stack, &Float)?;
            pop_expecting(stack, &Float)?;
            stack.push(Float);
        }

        DAdd | DSub | DDiv | DMul | DRem => {
            pop_expecting(stack, &Double)?;
            pop_expecting(stack, &Double)?;
            stack.push(Double);
        }

        LSh(_) => {
            pop_expecting(stack, &Integer)?;
            pop_expecting(stack, &Long)?;
            stack.push(Long);
        }

        IInc(index, _) => {
            get_local_expecting(locals, *index, &Integer)?;
        }

        INeg | I2B | I2C | I2S => convert(stack, Integer, Integer)?,
        LNeg => convert(stack, Long, Long)?,
        FNeg => convert(stack, Float, Float)?,
        DNeg => convert(stack, Double, Double)?,
        I2L => convert(stack, Integer, Long)?,
        I2F => convert(stack, Integer, Float)?,
        I2D => convert(stack, Integer, Double)?,
        L2I => convert(stack, Long, Integer)?,
        L2F => convert(stack, Long, Float)?,
        L2D => convert(stack, Long, Double)?,
        F2I => convert(stack, Float, Integer)?,
        F2L => convert(stack, Float, Long)?,
        F2D => convert(stack, Float, Double)?,
        D2I => convert(stack, Double, Integer)?,
        D2L => convert(stack, Double, Long)?,
        D2F => convert(stack, Double, Float)?,

        LCmp => {
            pop_expecting(stack, &Long)?;
            pop_expecting(stack, &Long)?;
            stack.push(Integer);
        }
        FCmp(_) => {
            pop_expecting(stack, &Float)?;
            pop_expecting(stack, &Float)?;
            stack.push(Integer);
        }
        DCmp(_) => {
            pop_expecting(stack, &Double)?;
            pop_expecting(stack, &Double)?;
            stack.push(Integer);
        }

        GetStatic(field) => {
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutStatic(field) => {
            pop_field_type(stack, &field.descriptor)?;
        }
        GetField(field) => {
            pop_reference(stack)?;
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutField(field) => {
            pop_field_type(stack, &field.descriptor)?;
            pop_reference(stack)?;
        }

        Invoke(invoke_type, method) => {
            for parameter in method.descriptor.parameters.iter().rev() {
                pop_field_type(stack, parameter)?;
            }

            if let (InvokeType::Special, true) = (invoke_type, method.is_init()) {
                let initialized = match pop(stack)? {
                    UninitializedThis => {
                        let initialized = VType::object(this_class.clone());
                        replace_all(stack, locals, &UninitializedThis, &initialized);
                        initialized
                    }
                    uninitialized @ Uninitialized(_) => {
                        let initialized = Object(method.class.clone());
                        replace_all(stack, locals, &uninitialized, &initialized);
                        initialized
                    }
                    _ => return Err(VerifierErrorKind::InvalidType),
                };
                log::trace!("Initialized {:?}", initialized);

                if method.descriptor.return_type.is_some() {
                    return Err(VerifierErrorKind::InvalidType);
                }
            } else {
                if !matches!(invoke_type, InvokeType::Static) {
                    pop_reference(stack)?;
                }
                if let Some(return_type) = &method.descriptor.return_type {
                    stack.push(VType::from(return_type.clone()));
                }
            }
        }

        InvokeDynamic(call_site) => {
            for parameter in call_site.descriptor.parameters.iter().rev() {
                pop_field_type(stack, parameter)?;
            }
            if let Some(return_type) = &call_site.descriptor.return_type {
                stack.push(VType::from(return_type.clone()));
            }
        }

        New(RefType::Object(_)) => {
            stack.push(Uninitialized(item));
        }
        New(_) => return Err(VerifierErrorKind::InvalidType),
        NewArray(base_type) => {
            pop_expecting(stack, &Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_expecting(stack, &Integer)?;
            stack.push(Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        MultiANewArray(ref_type, dimensions) => {
            for _ in 0..*dimensions {
                pop_expecting(stack, &Integer)?;
            }
            stack.push(Object(ref_type.clone()));
        }
        ArrayLength => {
            pop_array(stack)?;
            stack.push(Integer);
        }

        CheckCast(ref_type) => {
            pop_reference(stack)?;
            stack.push(Object(ref_type.clone()));
        }
        InstanceOf(_) => {
            pop_reference(stack)?;
            stack.push(Integer);
        }
        MonitorEnter | MonitorExit => {
            pop_reference(stack)?;
        }
    }

    Ok(())
}

fn execute_branch_instruction<Lbl>(
    frame: &mut VFrame,
    insn: &BranchInstruction<Lbl>,
    return_type: &Option<FieldType<BinaryName>>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;
    use VerificationType::*;

    let stack = &mut frame.stack;
    let expect_return = |expected: VType| -> Result<(), VerifierErrorKind> {
        match return_type {
            Some(typ) if VType::from(typ.clone()) == expected => Ok(()),
            _ => Err(VerifierErrorKind::InvalidType),
        }
    };

    match insn {
        If(_, _) => pop_expecting(stack, &Integer)?,
        IfICmp(_, _) => {
            pop_expecting(stack, &Integer)?;
            pop_expecting(stack, &Integer)?;
        }
        IfACmp(_, _) => {
            pop_reference(stack)?;
            pop_reference(stack)?;
        }
        IfNull(_, _) => {
            pop_reference(stack)?;
        }
        Goto(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => pop_expecting(stack, &Integer)?,
        IReturn => {
            pop_expecting(stack, &Integer)?;
            expect_return(Integer)?;
        }
        LReturn => {
            pop_expecting(stack, &Long)?;
            expect_return(Long)?;
        }
        FReturn => {
            pop_expecting(stack, &Float)?;
            expect_return(Float)?;
        }
        DReturn => {
            pop_expecting(stack, &Double)?;
            expect_return(Double)?;
        }
        AReturn => {
            pop_reference(stack)?;
            if !matches!(return_type, Some(FieldType::Ref(_))) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        Return => {
            if return_type.is_some() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AThrow => {
            let exception = pop_reference(stack)?;
            stack.clear();
            stack.push(exception);
        }
    }

    Ok(())
}

/// Pop a value of one type and push a value of another
fn convert(
    stack: &mut OffsetVec<VType>,
    from: VType,
    to: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, &from)?;
    stack.push(to);
    Ok(())
}

/// Replace every occurrence of an uninitialized type once its constructor has been called
fn replace_all(
    stack: &mut OffsetVec<VType>,
    locals: &mut [VType],
    original: &VType,
    updated: &VType,
) {
    let replaced: OffsetVec<VType> = std::mem::take(stack)
        .into_iter()
        .map(|(_, _, typ)| if typ == *original { updated.clone() } else { typ })
        .collect();
    *stack = replaced;
    for local in locals.iter_mut() {
        if local == original {
            *local = updated.clone();
        }
    }
}

fn get_local(locals: &[VType], index: u16) -> Result<VType, VerifierErrorKind> {
    locals
        .get(index as usize)
        .cloned()
        .ok_or(VerifierErrorKind::InvalidIndex)
}

fn get_local_expecting(
    locals: &[VType],
    index: u16,
    expected: &VType,
) -> Result<(), VerifierErrorKind> {
    if get_local(locals, index)? == *expected {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Write a local, clobbering whatever `long` or `double` the write overlaps
fn set_local(locals: &mut Vec<VType>, index: u16, typ: VType) {
    let index = index as usize;
    let width = typ.width();
    if locals.len() < index + width {
        locals.resize(index + width, VerificationType::Top);
    }
    if index > 0 && locals[index - 1].width() == 2 {
        locals[index - 1] = VerificationType::Top;
    }
    if locals[index].width() == 2 && width == 1 && index + 1 < locals.len() {
        locals[index + 1] = VerificationType::Top;
    }
    locals[index] = typ;
    if width == 2 {
        locals[index + 1] = VerificationType::Top;
    }
}

fn pop(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack
        .pop()
        .map(|(_, typ)| typ)
        .ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

fn pop_expecting(stack: &mut OffsetVec<VType>, expected: &VType) -> Result<(), VerifierErrorKind> {
    if pop(stack)? == *expected {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Pop any reference (the exact class is not checked)
fn pop_reference(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    if typ.is_reference() {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Pop an array (or `null`)
fn pop_array(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    match pop(stack)? {
        typ @ VerificationType::Object(RefType::ObjectArray(_))
        | typ @ VerificationType::Object(RefType::PrimitiveArray(_))
        | typ @ VerificationType::Null => Ok(typ),
        _ => Err(VerifierErrorKind::NotArrayType),
    }
}

/// Pop a value that could be stored in a field of the given type
fn pop_field_type(
    stack: &mut OffsetVec<VType>,
    field_type: &FieldType<BinaryName>,
) -> Result<(), VerifierErrorKind> {
    match field_type {
        FieldType::Ref(_) => pop_reference(stack).map(|_| ()),
        FieldType::Base(BaseType::Long) => pop_expecting(stack, &VerificationType::Long),
        FieldType::Base(BaseType::Double) => pop_expecting(stack, &VerificationType::Double),
        FieldType::Base(BaseType::Float) => pop_expecting(stack, &VerificationType::Float),
        FieldType::Base(_) => pop_expecting(stack, &VerificationType::Integer),
    }
}
