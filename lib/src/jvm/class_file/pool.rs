use crate::jvm::class_file::{
    Attribute, AttributeLike, ClassConstantIndex, Constant, ConstantIndex, ConstantsReader,
    FieldRefConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex, StringConstantIndex,
    Utf8ConstantIndex,
};
use crate::jvm::{BinaryName, Error, Name, RefType};
use crate::util::{Offset, OffsetVec, Width};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

/// Class file constants pool builder
///
/// The pool is append only: a pool seeded from an existing class file keeps every original
/// constant at its original index, so untouched parts of the class (other methods, attributes
/// this crate doesn't understand) stay valid. Only after the pool is fully built up, it can be
/// consumed into a regular [`OffsetVec`]. The [`ConstantsWriter`] trait exposes inserting types
/// into the constants pool.
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool::from_offset_vec(OffsetVec::new_starting_at(Offset(1)))
    }

    /// Make a pool that starts out with the constants of an existing class file
    ///
    /// When the existing pool has duplicate entries, the first one is the one that gets reused.
    pub fn from_offset_vec(constants: OffsetVec<Constant>) -> ConstantsPool {
        let mut pool = ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
        };

        for (offset, _, constant) in &constants {
            let index = ConstantIndex(offset.0 as u16);
            match constant {
                Constant::Utf8(string) => {
                    pool.utf8s
                        .entry(string.clone())
                        .or_insert(Utf8ConstantIndex(index));
                }
                Constant::Class(name) => {
                    pool.classes
                        .entry(*name)
                        .or_insert(ClassConstantIndex(index));
                }
                Constant::String(utf8) => {
                    pool.strings
                        .entry(*utf8)
                        .or_insert(StringConstantIndex(index));
                }
                Constant::Integer(integer) => {
                    pool.integers.entry(*integer).or_insert(index);
                }
                Constant::Float(float) => {
                    pool.floats.entry(float.to_bits()).or_insert(index);
                }
                Constant::Long(long) => {
                    pool.longs.entry(*long).or_insert(index);
                }
                Constant::Double(double) => {
                    pool.doubles.entry(double.to_bits()).or_insert(index);
                }
                Constant::NameAndType { name, descriptor } => {
                    pool.name_and_types
                        .entry((*name, *descriptor))
                        .or_insert(NameAndTypeConstantIndex(index));
                }
                Constant::FieldRef(class, name_and_type) => {
                    pool.fieldrefs
                        .entry((*class, *name_and_type))
                        .or_insert(FieldRefConstantIndex(index));
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface,
                } => {
                    pool.methodrefs
                        .entry((*class, *name_and_type, *is_interface))
                        .or_insert(MethodRefConstantIndex(index));
                }
                Constant::MethodHandle { .. }
                | Constant::MethodType { .. }
                | Constant::Dynamic { .. }
                | Constant::InvokeDynamic { .. }
                | Constant::Module(_)
                | Constant::Package(_) => (),
            }
        }

        pool.constants = constants;
        pool
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Number of slots used so far (what the `constant_pool_count` would be)
    pub fn len(&self) -> usize {
        self.constants.offset_len().0
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant from the constant pool
    ///
    /// The name is a binary name for classes and interfaces, or a descriptor for array types.
    pub fn get_class(
        &mut self,
        name: Utf8ConstantIndex,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
            self.classes.insert(name, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    pub fn get_field_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let key = (class, name_and_type);
        if let Some(idx) = self.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            let idx = FieldRefConstantIndex(self.push_constant(constant)?);
            self.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }

    pub fn get_method_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let key = (class, name_and_type, is_interface);
        if let Some(idx) = self.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant)?);
            self.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.integers.get(&integer) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Integer(integer))?;
            self.integers.insert(integer, idx);
            Ok(idx)
        }
    }

    /// Floats are deduplicated by bit pattern (so `NaN`s and `-0.0` are kept distinct)
    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Float(float))?;
            self.floats.insert(float.to_bits(), idx);
            Ok(idx)
        }
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.longs.get(&long) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Long(long))?;
            self.longs.insert(long, idx);
            Ok(idx)
        }
    }

    /// Doubles are deduplicated by bit pattern (so `NaN`s and `-0.0` are kept distinct)
    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Double(double))?;
            self.doubles.insert(double.to_bits(), idx);
            Ok(idx)
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsReader for ConstantsPool {
    fn constant_table(&self) -> &OffsetVec<Constant> {
        &self.constants
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

/// Things that can be put into a constant pool
pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(
        &self,
        constants_pool: &mut ConstantsPool,
    ) -> Result<Index, ConstantPoolOverflow>;
}

/// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
/// there are a handful of places where an array type needs to be fit in (eg. for a `checkcast`
/// to an array type). See [this section of the JVM specification][0] for more.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
impl ConstantsWriter<ClassConstantIndex> for RefType<BinaryName> {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = constants.get_utf8(self.to_class_name())?;
        constants.get_class(name)
    }
}

/// Write a `CONSTANT_Class_info`
impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = constants.get_utf8(self.as_str())?;
        constants.get_class(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seeded_pool_reuses_existing_constants() {
        let mut existing = OffsetVec::new_starting_at(Offset(1));
        existing.push(Constant::Utf8(String::from("java/lang/Object"))); // #1
        existing.push(Constant::Class(Utf8ConstantIndex(ConstantIndex(1)))); // #2
        existing.push(Constant::Double(1.5)); // #3, #4
        existing.push(Constant::Integer(42)); // #5

        let mut pool = ConstantsPool::from_offset_vec(existing);
        let object_utf8 = pool.get_utf8("java/lang/Object").unwrap();
        assert_eq!(object_utf8, Utf8ConstantIndex(ConstantIndex(1)));
        assert_eq!(
            pool.get_class(object_utf8).unwrap(),
            ClassConstantIndex(ConstantIndex(2))
        );
        assert_eq!(pool.get_double(1.5).unwrap(), ConstantIndex(3));
        assert_eq!(pool.get_integer(42).unwrap(), ConstantIndex(5));

        // New constants go after the existing ones
        assert_eq!(pool.get_long(42).unwrap(), ConstantIndex(6));
        assert_eq!(pool.get_integer(43).unwrap(), ConstantIndex(8));
        assert_eq!(pool.len(), 9);

        // Class constants go through their name
        let object = BinaryName::OBJECT.constant_index(&mut pool).unwrap();
        assert_eq!(object, ClassConstantIndex(ConstantIndex(2)));
        let strings = RefType::array(crate::jvm::FieldType::object(BinaryName::STRING));
        let strings_index = strings.constant_index(&mut pool).unwrap();
        assert_eq!(pool.class_type(strings_index).unwrap(), strings);
    }

    #[test]
    fn floats_keyed_by_bits() {
        let mut pool = ConstantsPool::new();
        let zero = pool.get_float(0.0).unwrap();
        let negative_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(zero, negative_zero);
        assert_eq!(pool.get_float(f32::NAN).unwrap(), pool.get_float(f32::NAN).unwrap());
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantsPool::new();
        for i in 0..(u16::MAX as i32 - 2) {
            pool.get_integer(i).unwrap();
        }
        assert_eq!(pool.len(), u16::MAX as usize - 1);
        pool.get_integer(-1).unwrap();
        assert!(pool.get_integer(-2).is_err());
        assert!(pool.get_long(0).is_err());
    }
}
