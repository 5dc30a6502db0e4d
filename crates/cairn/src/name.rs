use std::fmt::{Debug, Display};
use std::sync::Mutex;

use fxhash::FxHashMap;
use lazy_static::lazy_static;

struct Interner {
    ids: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl Interner {
    fn intern(&mut self, string: &str) -> u32 {
        if let Some(id) = self.ids.get(string) {
            return *id;
        }

        //Interned strings live for the whole process, which lets `Name` stay a Copy handle.
        let owned: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let id = self.strings.len() as u32;
        self.strings.push(owned);
        self.ids.insert(owned, id);
        id
    }
}

lazy_static! {
    static ref INTERNER: Mutex<Interner> = Mutex::new(Interner {
        ids: FxHashMap::default(),
        strings: Vec::new(),
    });
}

///Process-wide interned identifier with O(1) equality and a stable 32bit id. Names are never
/// freed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    pub fn new(string: &str) -> Self {
        Name(INTERNER.lock().unwrap().intern(string))
    }

    ///Reconstructs a name from a raw id, as stored in a [SubresourceId].
    pub(crate) fn from_raw(id: u32) -> Self {
        Name(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    pub fn as_str(&self) -> &'static str {
        INTERNER.lock().unwrap().strings[self.0 as usize]
    }
}

impl From<&str> for Name {
    fn from(string: &str) -> Self {
        Name::new(string)
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name({:?})", self.as_str())
    }
}

///Packed key of a single subresource: the resource name's id in the upper 32 bits, the
/// subresource index in the lower ones.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubresourceId(u64);

impl SubresourceId {
    pub fn new(resource: Name, subresource_index: u32) -> Self {
        SubresourceId(((resource.id() as u64) << 32) | subresource_index as u64)
    }

    pub fn resource(&self) -> Name {
        Name::from_raw((self.0 >> 32) as u32)
    }

    pub fn index(&self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

impl Display for SubresourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.resource(), self.index())
    }
}

impl Debug for SubresourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubresourceId({}[{}])", self.resource(), self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = Name::new("GBufferAlbedo");
        let b = Name::new("GBufferAlbedo");
        let c = Name::new("GBufferNormals");

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "GBufferAlbedo");
    }

    #[test]
    fn subresource_roundtrip() {
        let name = Name::new("ShadowMap");
        let sub = SubresourceId::new(name, 3);

        assert_eq!(sub.resource(), name);
        assert_eq!(sub.index(), 3);
        assert_ne!(sub, SubresourceId::new(name, 4));
    }
}
