//! Decoding of a `Code` attribute into a [`MethodCode`]
//!
//! Decoding happens in two passes. The first walks the bytecode array and produces instructions
//! whose operands are still constant pool indices and whose jump targets are still absolute
//! offsets. The second pass decides which offsets need labels (jump targets, exception ranges,
//! local variable ranges), checks that those offsets land on instruction boundaries, and resolves
//! the constant pool operands into names.

use super::instruction::array_type_code;
use super::{
    BranchInstruction, CodeItem, CompareMode, ConstantData, EqComparison,
    FieldRef, Instruction, InvokeDynamicRef, InvokeType, LabelGenerator, LocalVariableRange,
    MethodCode, MethodRef, OrdComparison, PoolInstruction, ShiftType, SymInstruction, SynLabel,
    SynLabelGenerator, TryCatchBlock,
};
use crate::jvm::class_file::{
    ClassConstantIndex, Code, ConstantIndex, ConstantsReader, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, LineNumberTable, LocalVariableTable, LocalVariableTypeTable,
    MethodRefConstantIndex,
};
use crate::jvm::{BaseType, Error};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

/// Instruction as found in the bytecode array
enum RawInstruction {
    Plain(PoolInstruction),

    /// Jump targets are absolute offsets
    Branch(BranchInstruction<usize>),
}

impl MethodCode {
    /// Decode a method body
    ///
    /// `LineNumberTable`, `LocalVariableTable`, and `LocalVariableTypeTable` attributes of the
    /// code are carried over. Other code attributes (including the `StackMapTable`) are not: they
    /// are regenerated or dropped when the method is encoded again.
    pub fn decode(code: &Code, constants: &impl ConstantsReader) -> Result<MethodCode, Error> {
        let bytecode = &code.code_array.0;
        let instructions = decode_instructions(bytecode)?;
        let boundaries: BTreeSet<usize> = instructions.iter().map(|(offset, _)| *offset).collect();
        let code_len = bytecode.len();
        let is_boundary = |offset: usize| boundaries.contains(&offset) || offset == code_len;

        // Offsets that need a label
        let mut labelled: BTreeSet<usize> = BTreeSet::new();
        for (offset, instruction) in &instructions {
            if let RawInstruction::Branch(branch) = instruction {
                for target in branch.jump_targets() {
                    if !boundaries.contains(target) {
                        return Err(Error::Malformed(format!(
                            "jump at {} to {} is not to the start of an instruction",
                            offset, target
                        )));
                    }
                    labelled.insert(*target);
                }
            }
        }
        for handler in &code.exception_table {
            let start = handler.start_pc.0 as usize;
            let end = handler.end_pc.0 as usize;
            let handler_pc = handler.handler_pc.0 as usize;
            if !boundaries.contains(&start) || !is_boundary(end) || start >= end {
                return Err(Error::Malformed(format!(
                    "exception range {}..{} does not line up with instructions",
                    start, end
                )));
            }
            if !boundaries.contains(&handler_pc) {
                return Err(Error::Malformed(format!(
                    "exception handler at {} is not the start of an instruction",
                    handler_pc
                )));
            }
            labelled.extend([start, end, handler_pc]);
        }

        // Debug attributes
        let mut line_numbers: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
        let mut raw_local_variables = vec![];
        for attribute in &code.attributes {
            let name = attribute.name(constants)?;
            if name == "LineNumberTable" {
                let table: LineNumberTable = attribute.decode()?;
                for entry in table.0 {
                    let start = entry.start_pc.0 as usize;
                    if boundaries.contains(&start) {
                        line_numbers.entry(start).or_default().push(entry.line_number);
                    } else {
                        log::warn!("Dropping line number entry at invalid offset {}", start);
                    }
                }
            } else if name == "LocalVariableTable" || name == "LocalVariableTypeTable" {
                let is_type_table = name == "LocalVariableTypeTable";
                let entries = if is_type_table {
                    attribute.decode::<LocalVariableTypeTable>()?.0
                } else {
                    attribute.decode::<LocalVariableTable>()?.0
                };
                for entry in entries {
                    let start = entry.start_pc.0 as usize;
                    let end = start + entry.length as usize;
                    if boundaries.contains(&start) && is_boundary(end) {
                        labelled.extend([start, end]);
                        raw_local_variables.push((start, end, entry, is_type_table));
                    } else {
                        log::warn!(
                            "Dropping local variable entry with invalid range {}..{}",
                            start,
                            end
                        );
                    }
                }
            }
        }

        // Labels are handed out in offset order
        let mut labels = SynLabelGenerator::default();
        let offset_labels: BTreeMap<usize, SynLabel> = labelled
            .into_iter()
            .map(|offset| (offset, labels.fresh_label()))
            .collect();
        let label_at = |offset: &usize| -> Result<SynLabel, Error> {
            offset_labels.get(offset).copied().ok_or_else(|| {
                Error::Malformed(format!("no instruction boundary at {}", offset))
            })
        };

        let mut items = vec![];
        for (offset, instruction) in instructions {
            if let Some(label) = offset_labels.get(&offset) {
                items.push(CodeItem::Label(*label));
            }
            if let Some(lines) = line_numbers.get(&offset) {
                items.extend(lines.iter().map(|line| CodeItem::LineNumber(*line)));
            }
            items.push(match instruction {
                RawInstruction::Plain(instruction) => {
                    CodeItem::Instruction(resolve_operands(&instruction, constants)?)
                }
                RawInstruction::Branch(branch) => CodeItem::Branch(branch.map_labels(&label_at)?),
            });
        }
        if let Some(label) = offset_labels.get(&code_len) {
            items.push(CodeItem::Label(*label));
        }

        let exception_handlers = code
            .exception_table
            .iter()
            .map(|handler| {
                let catch_type = match handler.catch_type {
                    ClassConstantIndex(ConstantIndex(0)) => None,
                    catch_type => Some(constants.binary_name(catch_type)?),
                };
                Ok(TryCatchBlock {
                    start: label_at(&(handler.start_pc.0 as usize))?,
                    end: label_at(&(handler.end_pc.0 as usize))?,
                    handler: label_at(&(handler.handler_pc.0 as usize))?,
                    catch_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let local_variables = raw_local_variables
            .into_iter()
            .map(|(start, end, entry, is_type_table)| {
                Ok(LocalVariableRange {
                    start: label_at(&start)?,
                    end: label_at(&end)?,
                    name_index: entry.name_index,
                    descriptor_index: entry.descriptor_index,
                    index: entry.index,
                    is_type_table,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(MethodCode {
            items,
            exception_handlers,
            local_variables,
            labels,
        })
    }
}

fn resolve_operands(
    instruction: &PoolInstruction,
    constants: &impl ConstantsReader,
) -> Result<SymInstruction, Error> {
    instruction.map(
        |class: &ClassConstantIndex| constants.class_type(*class),
        |constant: &ConstantIndex| ConstantData::read(constants, *constant),
        |field: &FieldRefConstantIndex| FieldRef::read(constants, *field),
        |method: &MethodRefConstantIndex| MethodRef::read(constants, *method),
        |indy: &InvokeDynamicConstantIndex| InvokeDynamicRef::read(constants, *indy),
    )
}

/// Split the bytecode array into instructions
fn decode_instructions(bytecode: &[u8]) -> Result<Vec<(usize, RawInstruction)>, Error> {
    let mut reader = Cursor::new(bytecode);
    let mut instructions = vec![];
    while (reader.position() as usize) < bytecode.len() {
        let offset = reader.position() as usize;
        let instruction = decode_instruction(&mut reader, offset).map_err(|err| match err {
            Error::IoError(_) => {
                Error::Malformed(format!("truncated instruction at offset {}", offset))
            }
            other => other,
        })?;
        if let RawInstruction::Branch(branch) = &instruction {
            if let Some(target) = branch.jump_targets().into_iter().find(|t| **t >= bytecode.len())
            {
                return Err(Error::Malformed(format!(
                    "jump at {} to {} is past the end of the code",
                    offset, target
                )));
            }
        }
        instructions.push((offset, instruction));
    }
    Ok(instructions)
}

fn jump_target(offset: usize, relative: i64) -> Result<usize, Error> {
    let target = offset as i64 + relative;
    if target < 0 {
        return Err(Error::Malformed(format!(
            "jump at {} to negative offset {}",
            offset, target
        )));
    }
    Ok(target as usize)
}

fn decode_instruction(
    reader: &mut Cursor<&[u8]>,
    offset: usize,
) -> Result<RawInstruction, Error> {
    use Instruction::*;

    let short_jump = |reader: &mut Cursor<&[u8]>| -> Result<usize, Error> {
        jump_target(offset, reader.read_i16::<BigEndian>()? as i64)
    };
    let class = |reader: &mut Cursor<&[u8]>| -> Result<ClassConstantIndex, Error> {
        Ok(ClassConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?)))
    };
    let field = |reader: &mut Cursor<&[u8]>| -> Result<FieldRefConstantIndex, Error> {
        Ok(FieldRefConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?)))
    };
    let method = |reader: &mut Cursor<&[u8]>| -> Result<MethodRefConstantIndex, Error> {
        Ok(MethodRefConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?)))
    };

    let opcode = reader.read_u8()?;
    let plain = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02 => IConstM1,
        0x03 => IConst0,
        0x04 => IConst1,
        0x05 => IConst2,
        0x06 => IConst3,
        0x07 => IConst4,
        0x08 => IConst5,
        0x09 => LConst0,
        0x0a => LConst1,
        0x0b => FConst0,
        0x0c => FConst1,
        0x0d => FConst2,
        0x0e => DConst0,
        0x0f => DConst1,
        0x10 => BiPush(reader.read_i8()?),
        0x11 => SiPush(reader.read_i16::<BigEndian>()?),
        0x12 => Ldc(ConstantIndex(reader.read_u8()? as u16)),
        0x13 => Ldc(ConstantIndex(reader.read_u16::<BigEndian>()?)),
        0x14 => Ldc2(ConstantIndex(reader.read_u16::<BigEndian>()?)),
        0x15 => ILoad(reader.read_u8()? as u16),
        0x16 => LLoad(reader.read_u8()? as u16),
        0x17 => FLoad(reader.read_u8()? as u16),
        0x18 => DLoad(reader.read_u8()? as u16),
        0x19 => ALoad(reader.read_u8()? as u16),
        0x1a..=0x1d => ILoad((opcode - 0x1a) as u16),
        0x1e..=0x21 => LLoad((opcode - 0x1e) as u16),
        0x22..=0x25 => FLoad((opcode - 0x22) as u16),
        0x26..=0x29 => DLoad((opcode - 0x26) as u16),
        0x2a..=0x2d => ALoad((opcode - 0x2a) as u16),
        0x2e => IALoad,
        0x2f => LALoad,
        0x30 => FALoad,
        0x31 => DALoad,
        0x32 => AALoad,
        0x33 => BALoad,
        0x34 => CALoad,
        0x35 => SALoad,
        0x36 => IStore(reader.read_u8()? as u16),
        0x37 => LStore(reader.read_u8()? as u16),
        0x38 => FStore(reader.read_u8()? as u16),
        0x39 => DStore(reader.read_u8()? as u16),
        0x3a => AStore(reader.read_u8()? as u16),
        0x3b..=0x3e => IStore((opcode - 0x3b) as u16),
        0x3f..=0x42 => LStore((opcode - 0x3f) as u16),
        0x43..=0x46 => FStore((opcode - 0x43) as u16),
        0x47..=0x4a => DStore((opcode - 0x47) as u16),
        0x4b..=0x4e => AStore((opcode - 0x4b) as u16),
        0x4f => IAStore,
        0x50 => LAStore,
        0x51 => FAStore,
        0x52 => DAStore,
        0x53 => AAStore,
        0x54 => BAStore,
        0x55 => CAStore,
        0x56 => SAStore,
        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,
        0x60 => IAdd,
        0x61 => LAdd,
        0x62 => FAdd,
        0x63 => DAdd,
        0x64 => ISub,
        0x65 => LSub,
        0x66 => FSub,
        0x67 => DSub,
        0x68 => IMul,
        0x69 => LMul,
        0x6a => FMul,
        0x6b => DMul,
        0x6c => IDiv,
        0x6d => LDiv,
        0x6e => FDiv,
        0x6f => DDiv,
        0x70 => IRem,
        0x71 => LRem,
        0x72 => FRem,
        0x73 => DRem,
        0x74 => INeg,
        0x75 => LNeg,
        0x76 => FNeg,
        0x77 => DNeg,
        0x78 => ISh(ShiftType::Left),
        0x79 => LSh(ShiftType::Left),
        0x7a => ISh(ShiftType::ArithmeticRight),
        0x7b => LSh(ShiftType::ArithmeticRight),
        0x7c => ISh(ShiftType::LogicalRight),
        0x7d => LSh(ShiftType::LogicalRight),
        0x7e => IAnd,
        0x7f => LAnd,
        0x80 => IOr,
        0x81 => LOr,
        0x82 => IXor,
        0x83 => LXor,
        0x84 => IInc(reader.read_u8()? as u16, reader.read_i8()? as i16),
        0x85 => I2L,
        0x86 => I2F,
        0x87 => I2D,
        0x88 => L2I,
        0x89 => L2F,
        0x8a => L2D,
        0x8b => F2I,
        0x8c => F2L,
        0x8d => F2D,
        0x8e => D2I,
        0x8f => D2L,
        0x90 => D2F,
        0x91 => I2B,
        0x92 => I2C,
        0x93 => I2S,
        0x94 => LCmp,
        0x95 => FCmp(CompareMode::L),
        0x96 => FCmp(CompareMode::G),
        0x97 => DCmp(CompareMode::L),
        0x98 => DCmp(CompareMode::G),
        0x99..=0x9e => {
            let comparison = ord_comparison(opcode - 0x99);
            return Ok(RawInstruction::Branch(BranchInstruction::If(
                comparison,
                short_jump(reader)?,
            )));
        }
        0x9f..=0xa4 => {
            let comparison = ord_comparison(opcode - 0x9f);
            return Ok(RawInstruction::Branch(BranchInstruction::IfICmp(
                comparison,
                short_jump(reader)?,
            )));
        }
        0xa5 | 0xa6 => {
            let comparison = eq_comparison(opcode == 0xa5);
            return Ok(RawInstruction::Branch(BranchInstruction::IfACmp(
                comparison,
                short_jump(reader)?,
            )));
        }
        0xa7 => return Ok(RawInstruction::Branch(BranchInstruction::Goto(short_jump(reader)?))),
        0xaa => {
            skip_switch_padding(reader, offset)?;
            let default = jump_target(offset, reader.read_i32::<BigEndian>()? as i64)?;
            let low = reader.read_i32::<BigEndian>()?;
            let high = reader.read_i32::<BigEndian>()?;
            if high < low {
                return Err(Error::Malformed(format!(
                    "tableswitch at {} has high {} below low {}",
                    offset, high, low
                )));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let targets = (0..count)
                .map(|_| jump_target(offset, reader.read_i32::<BigEndian>()? as i64))
                .collect::<Result<Vec<_>, Error>>()?;
            return Ok(RawInstruction::Branch(BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            }));
        }
        0xab => {
            skip_switch_padding(reader, offset)?;
            let default = jump_target(offset, reader.read_i32::<BigEndian>()? as i64)?;
            let count = reader.read_i32::<BigEndian>()?;
            if count < 0 {
                return Err(Error::Malformed(format!(
                    "lookupswitch at {} has negative pair count",
                    offset
                )));
            }
            let targets = (0..count)
                .map(|_| {
                    let key = reader.read_i32::<BigEndian>()?;
                    Ok((key, jump_target(offset, reader.read_i32::<BigEndian>()? as i64)?))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            return Ok(RawInstruction::Branch(BranchInstruction::LookupSwitch {
                default,
                targets,
            }));
        }
        0xac => return Ok(RawInstruction::Branch(BranchInstruction::IReturn)),
        0xad => return Ok(RawInstruction::Branch(BranchInstruction::LReturn)),
        0xae => return Ok(RawInstruction::Branch(BranchInstruction::FReturn)),
        0xaf => return Ok(RawInstruction::Branch(BranchInstruction::DReturn)),
        0xb0 => return Ok(RawInstruction::Branch(BranchInstruction::AReturn)),
        0xb1 => return Ok(RawInstruction::Branch(BranchInstruction::Return)),
        0xb2 => GetStatic(field(reader)?),
        0xb3 => PutStatic(field(reader)?),
        0xb4 => GetField(field(reader)?),
        0xb5 => PutField(field(reader)?),
        0xb6 => Invoke(InvokeType::Virtual, method(reader)?),
        0xb7 => Invoke(InvokeType::Special, method(reader)?),
        0xb8 => Invoke(InvokeType::Static, method(reader)?),
        0xb9 => {
            let index = method(reader)?;
            let count = reader.read_u8()?;
            let _zero = reader.read_u8()?;
            Invoke(InvokeType::Interface(count), index)
        }
        0xba => {
            let index = InvokeDynamicConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?));
            let _zero = reader.read_u16::<BigEndian>()?;
            InvokeDynamic(index)
        }
        0xbb => New(class(reader)?),
        0xbc => {
            let atype = reader.read_u8()?;
            let base_type = [
                BaseType::Boolean,
                BaseType::Char,
                BaseType::Float,
                BaseType::Double,
                BaseType::Byte,
                BaseType::Short,
                BaseType::Int,
                BaseType::Long,
            ]
            .into_iter()
            .find(|base_type| array_type_code(*base_type) == atype)
            .ok_or_else(|| {
                Error::Malformed(format!("newarray at {} has bad type {}", offset, atype))
            })?;
            NewArray(base_type)
        }
        0xbd => ANewArray(class(reader)?),
        0xbe => ArrayLength,
        0xbf => return Ok(RawInstruction::Branch(BranchInstruction::AThrow)),
        0xc0 => CheckCast(class(reader)?),
        0xc1 => InstanceOf(class(reader)?),
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,
        0xc4 => {
            let modified = reader.read_u8()?;
            let index = reader.read_u16::<BigEndian>()?;
            match modified {
                0x15 => ILoad(index),
                0x16 => LLoad(index),
                0x17 => FLoad(index),
                0x18 => DLoad(index),
                0x19 => ALoad(index),
                0x36 => IStore(index),
                0x37 => LStore(index),
                0x38 => FStore(index),
                0x39 => DStore(index),
                0x3a => AStore(index),
                0x84 => IInc(index, reader.read_i16::<BigEndian>()?),
                other => {
                    return Err(Error::UnsupportedInstruction {
                        opcode: other,
                        offset,
                    })
                }
            }
        }
        0xc5 => MultiANewArray(class(reader)?, reader.read_u8()?),
        0xc6 | 0xc7 => {
            let comparison = eq_comparison(opcode == 0xc6);
            return Ok(RawInstruction::Branch(BranchInstruction::IfNull(
                comparison,
                short_jump(reader)?,
            )));
        }
        0xc8 => {
            let target = jump_target(offset, reader.read_i32::<BigEndian>()? as i64)?;
            return Ok(RawInstruction::Branch(BranchInstruction::Goto(target)));
        }

        // `jsr`, `ret`, `jsr_w`, and reserved opcodes
        other => {
            return Err(Error::UnsupportedInstruction {
                opcode: other,
                offset,
            })
        }
    };
    Ok(RawInstruction::Plain(plain))
}

/// Comparisons in the order they appear in the opcode table (`ifeq`, `ifne`, `iflt`, ...)
fn ord_comparison(index: u8) -> OrdComparison {
    match index {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

fn eq_comparison(is_eq: bool) -> EqComparison {
    if is_eq {
        EqComparison::EQ
    } else {
        EqComparison::NE
    }
}

fn skip_switch_padding(reader: &mut Cursor<&[u8]>, offset: usize) -> Result<(), Error> {
    for _ in 0..super::switch_padding(offset) {
        reader.read_u8()?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{
        BytecodeArray, BytecodeIndex, ConstantsPool, ExceptionHandler,
    };

    fn code(bytes: Vec<u8>) -> Code {
        Code {
            max_stack: 2,
            max_locals: 2,
            code_array: BytecodeArray(bytes),
            exception_table: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn branch_targets_become_labels() {
        // 0: iload_1; 1: ifeq +5; 4: iconst_1; 5: ireturn; 6: iconst_0; 7: ireturn
        let code = code(vec![0x1b, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]);
        let method_code = MethodCode::decode(&code, &ConstantsPool::new()).unwrap();
        let label = match &method_code.items[1] {
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, label)) => *label,
            other => panic!("unexpected item {:?}", other),
        };
        assert_eq!(method_code.items[4], CodeItem::Label(label));
        assert_eq!(
            method_code.items[5],
            CodeItem::Instruction(Instruction::IConst0)
        );
        assert_eq!(method_code.items.len(), 7);
    }

    #[test]
    fn wide_forms_fold_into_plain_instructions() {
        let code = code(vec![0xc4, 0x84, 0x01, 0x00, 0x03, 0xe8, 0xb1]);
        let method_code = MethodCode::decode(&code, &ConstantsPool::new()).unwrap();
        assert_eq!(
            method_code.items[0],
            CodeItem::Instruction(Instruction::IInc(256, 1000))
        );
    }

    #[test]
    fn subroutines_are_rejected() {
        let code = code(vec![0xa8, 0x00, 0x03, 0xb1]);
        assert!(matches!(
            MethodCode::decode(&code, &ConstantsPool::new()),
            Err(Error::UnsupportedInstruction {
                opcode: 0xa8,
                offset: 0
            })
        ));
    }

    #[test]
    fn jump_into_the_middle_of_an_instruction() {
        // 0: goto +4 (into the operand of the sipush at 3)
        let code = code(vec![0xa7, 0x00, 0x04, 0x11, 0x00, 0x01, 0xb1]);
        assert!(matches!(
            MethodCode::decode(&code, &ConstantsPool::new()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn truncated_operand() {
        let code = code(vec![0x11, 0x00]);
        assert!(matches!(
            MethodCode::decode(&code, &ConstantsPool::new()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn exception_ranges() {
        // 0: aconst_null; 1: athrow; 2: astore_1; 3: return
        let mut code = code(vec![0x01, 0xbf, 0x4c, 0xb1]);
        code.exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(0),
            end_pc: BytecodeIndex(2),
            handler_pc: BytecodeIndex(2),
            catch_type: ClassConstantIndex(ConstantIndex(0)),
        });
        let method_code = MethodCode::decode(&code, &ConstantsPool::new()).unwrap();
        assert_eq!(method_code.exception_handlers.len(), 1);
        let block = &method_code.exception_handlers[0];
        assert_eq!(block.end, block.handler);
        assert_eq!(block.catch_type, None);
        assert_eq!(method_code.items[0], CodeItem::Label(block.start));
    }
}
