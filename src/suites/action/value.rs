//! Action descriptor values.

use crate::fourcc::fourcc;
use crate::plugin::AeteData;

/// `typeInteger`.
pub const TYPE_INTEGER: u32 = fourcc(b"long");
/// `typeFloat`.
pub const TYPE_FLOAT: u32 = fourcc(b"doub");
/// `typeUnitFloat`.
pub const TYPE_UNIT_FLOAT: u32 = fourcc(b"UntF");
/// `typeChar`.
pub const TYPE_CHAR: u32 = fourcc(b"TEXT");
/// `typeBoolean`.
pub const TYPE_BOOLEAN: u32 = fourcc(b"bool");
/// `typeValueList`.
pub const TYPE_LIST: u32 = fourcc(b"VlLs");
/// `typeObject`.
pub const TYPE_OBJECT: u32 = fourcc(b"Objc");
/// `typeGlobalObject`.
pub const TYPE_GLOBAL_OBJECT: u32 = fourcc(b"GlbO");
/// `typeEnumerated`.
pub const TYPE_ENUMERATED: u32 = fourcc(b"enum");
/// `typeObjectSpecifier`.
pub const TYPE_REFERENCE: u32 = fourcc(b"obj ");
/// `typeType`.
pub const TYPE_CLASS: u32 = fourcc(b"type");
/// `typeGlobalClass`.
pub const TYPE_GLOBAL_CLASS: u32 = fourcc(b"GlbC");
/// `typeAlias`.
pub const TYPE_ALIAS: u32 = fourcc(b"alis");
/// `typeRawData`.
pub const TYPE_RAW_DATA: u32 = fourcc(b"tdta");

/// `formClass`.
pub const FORM_CLASS: u32 = fourcc(b"Clss");
/// `formName`.
pub const FORM_NAME: u32 = fourcc(b"name");
/// `formIndex`.
pub const FORM_INDEX: u32 = fourcc(b"indx");
/// `formIdentifier`.
pub const FORM_IDENTIFIER: u32 = fourcc(b"Idnt");
/// `formOffset`.
pub const FORM_OFFSET: u32 = fourcc(b"rele");
/// `formEnumerated`.
pub const FORM_ENUMERATED: u32 = fourcc(b"Enmr");
/// `formProperty`.
pub const FORM_PROPERTY: u32 = fourcc(b"prop");

/// One value stored under a key or in a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    /// 32-bit integer.
    Integer(i32),
    /// Double.
    Float(f64),
    /// Double with a unit.
    UnitFloat {
        /// Unit id.
        unit: u32,
        /// Value.
        value: f64,
    },
    /// Bytes of a C string, without the terminator.
    String(Vec<u8>),
    /// Boolean.
    Boolean(bool),
    /// Nested list.
    List(ActionList),
    /// Object of a class.
    Object {
        /// Class id.
        class: u32,
        /// Object properties.
        descriptor: ActionDescriptor,
    },
    /// Global object of a class.
    GlobalObject {
        /// Class id.
        class: u32,
        /// Object properties.
        descriptor: ActionDescriptor,
    },
    /// Enumerated value.
    Enumerated {
        /// Enumeration type id.
        type_id: u32,
        /// Value id.
        value: u32,
    },
    /// Reference to an object.
    Reference(ActionReference),
    /// Class id.
    Class(u32),
    /// Global class id.
    GlobalClass(u32),
    /// Alias record bytes.
    Alias(Vec<u8>),
    /// Opaque bytes.
    RawData(Vec<u8>),
}

impl ActionValue {
    /// The descriptor type id reported by `GetType`.
    pub fn type_id(&self) -> u32 {
        match self {
            Self::Integer(_) => TYPE_INTEGER,
            Self::Float(_) => TYPE_FLOAT,
            Self::UnitFloat { .. } => TYPE_UNIT_FLOAT,
            Self::String(_) => TYPE_CHAR,
            Self::Boolean(_) => TYPE_BOOLEAN,
            Self::List(_) => TYPE_LIST,
            Self::Object { .. } => TYPE_OBJECT,
            Self::GlobalObject { .. } => TYPE_GLOBAL_OBJECT,
            Self::Enumerated { .. } => TYPE_ENUMERATED,
            Self::Reference(_) => TYPE_REFERENCE,
            Self::Class(_) => TYPE_CLASS,
            Self::GlobalClass(_) => TYPE_GLOBAL_CLASS,
            Self::Alias(_) => TYPE_ALIAS,
            Self::RawData(_) => TYPE_RAW_DATA,
        }
    }
}

/// Key-ordered, key-unique values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionDescriptor {
    entries: Vec<(u32, ActionValue)>,
}

impl ActionDescriptor {
    /// An empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing an existing value in place.
    pub fn put(&mut self, key: u32, value: ActionValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value under `key`.
    pub fn get(&self, key: u32) -> Option<&ActionValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&mut self, key: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.len() != before
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    /// Key at position `index`.
    pub fn key_at(&self, index: usize) -> Option<u32> {
        self.entries.get(index).map(|(k, _)| *k)
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ActionValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Apply the "is array" parameter flags: integers stored under an array
    /// key become one-element lists.
    pub fn apply_terminology(&mut self, aete: &AeteData) {
        for (key, value) in &mut self.entries {
            if aete.is_array(*key) {
                if let ActionValue::Integer(n) = *value {
                    *value = ActionValue::List(ActionList::from(vec![ActionValue::Integer(n)]));
                }
            }
        }
    }
}

/// Ordered values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionList {
    items: Vec<ActionValue>,
}

impl ActionList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn push(&mut self, value: ActionValue) {
        self.items.push(value);
    }

    /// Value at `index`.
    pub fn get(&self, index: usize) -> Option<&ActionValue> {
        self.items.get(index)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values in order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionValue> {
        self.items.iter()
    }
}

impl From<Vec<ActionValue>> for ActionList {
    fn from(items: Vec<ActionValue>) -> Self {
        Self { items }
    }
}

/// How a reference item designates its object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceForm {
    /// The class itself.
    Class,
    /// By name.
    Name(Vec<u8>),
    /// By index.
    Index(u32),
    /// By unique id.
    Identifier(u32),
    /// Relative offset.
    Offset(i32),
    /// By enumerated value.
    Enumerated {
        /// Enumeration type id.
        type_id: u32,
        /// Value id.
        value: u32,
    },
    /// A property.
    Property(u32),
}

impl ReferenceForm {
    /// The form id reported by `GetForm`.
    pub fn form_id(&self) -> u32 {
        match self {
            Self::Class => FORM_CLASS,
            Self::Name(_) => FORM_NAME,
            Self::Index(_) => FORM_INDEX,
            Self::Identifier(_) => FORM_IDENTIFIER,
            Self::Offset(_) => FORM_OFFSET,
            Self::Enumerated { .. } => FORM_ENUMERATED,
            Self::Property(_) => FORM_PROPERTY,
        }
    }
}

/// One level of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceItem {
    /// Class of the designated object.
    pub desired_class: u32,
    /// How it is designated.
    pub form: ReferenceForm,
}

/// A chain of reference items, innermost first.
///
/// Getters read the first item; the container is the rest of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionReference {
    items: Vec<ReferenceItem>,
}

impl ActionReference {
    /// An empty reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item.
    pub fn push(&mut self, item: ReferenceItem) {
        self.items.push(item);
    }

    /// The innermost item.
    pub fn first(&self) -> Option<&ReferenceItem> {
        self.items.first()
    }

    /// Everything but the innermost item, or `None` when nothing remains.
    pub fn container(&self) -> Option<Self> {
        (self.items.len() > 1).then(|| Self {
            items: self.items[1..].to_vec(),
        })
    }

    /// Items, innermost first.
    pub fn items(&self) -> &[ReferenceItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the reference is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::AETE_FLAG_IS_ARRAY;

    #[test]
    fn test_put_replaces_in_place() {
        let mut d = ActionDescriptor::new();
        d.put(1, ActionValue::Integer(1));
        d.put(2, ActionValue::Boolean(true));
        d.put(1, ActionValue::Float(2.5));
        assert_eq!(d.len(), 2);
        assert_eq!(d.key_at(0), Some(1));
        assert_eq!(d.get(1), Some(&ActionValue::Float(2.5)));
        assert!(d.remove(1));
        assert!(!d.remove(1));
        assert_eq!(d.key_at(0), Some(2));
    }

    #[test]
    fn test_apply_terminology() {
        let mut aete = AeteData::new();
        aete.insert(fourcc(b"Amnt"), AETE_FLAG_IS_ARRAY);
        aete.insert(fourcc(b"Rds "), 0);

        let mut d = ActionDescriptor::new();
        d.put(fourcc(b"Amnt"), ActionValue::Integer(5));
        d.put(fourcc(b"Rds "), ActionValue::Integer(3));
        d.apply_terminology(&aete);

        assert_eq!(
            d.get(fourcc(b"Amnt")),
            Some(&ActionValue::List(vec![ActionValue::Integer(5)].into()))
        );
        assert_eq!(d.get(fourcc(b"Rds ")), Some(&ActionValue::Integer(3)));
    }

    #[test]
    fn test_reference_container() {
        let mut r = ActionReference::new();
        r.push(ReferenceItem {
            desired_class: 1,
            form: ReferenceForm::Index(2),
        });
        assert!(r.container().is_none());
        r.push(ReferenceItem {
            desired_class: 3,
            form: ReferenceForm::Class,
        });
        let container = r.container().unwrap();
        assert_eq!(container.first().unwrap().desired_class, 3);
        assert_eq!(r.first().unwrap().form.form_id(), FORM_INDEX);
    }
}
