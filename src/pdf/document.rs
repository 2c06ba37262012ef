//! In-memory PDF document the security engine walks

use std::collections::{BTreeMap, BTreeSet};

use super::{Dictionary, Object, ObjectId};
use crate::EncryptionType;

/// Object graph plus trailer
///
/// Objects are keyed by their identity and kept in ascending object number
/// order. Foxit DRM parameter strings staged for the next encryption pass live
/// alongside the graph until they are written into an encryption dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    version: String,
    objects: BTreeMap<ObjectId, Object>,
    trailer: Dictionary,
    drm_params: BTreeMap<String, String>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_version("1.7")
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Add an object under the next free object number
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = ObjectId::new(self.max_object_number() + 1, 0);
        self.objects.insert(id, object.into());
        id
    }

    /// Insert or replace an object
    pub fn insert(&mut self, id: ObjectId, object: impl Into<Object>) -> Option<Object> {
        self.objects.insert(id, object.into())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    /// Indirect objects in ascending object number
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().next_back().map_or(0, |id| id.number)
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// First element of the trailer `/ID` array
    pub fn file_id(&self) -> Option<&[u8]> {
        self.trailer
            .get_array("ID")
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
    }

    /// Reference held by trailer `/Encrypt`, if it is indirect
    pub fn encrypt_ref(&self) -> Option<ObjectId> {
        self.trailer.get_reference("Encrypt")
    }

    /// Resolved encryption dictionary (direct or indirect)
    pub fn encryption_dict(&self) -> Option<&Dictionary> {
        match self.trailer.get("Encrypt")? {
            Object::Dictionary(dict) => Some(dict),
            Object::Reference(id) => self.get(*id).and_then(Object::as_dict),
            _ => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_dict().is_some()
    }

    /// Filter name of the encryption dictionary
    pub fn security_filter(&self) -> Option<&str> {
        self.encryption_dict().and_then(|dict| dict.get_name("Filter"))
    }

    pub fn encryption_type(&self) -> EncryptionType {
        match self.security_filter() {
            None => EncryptionType::NoEncrypt,
            Some(filter) => EncryptionType::from_filter(filter),
        }
    }

    /// Objects reachable from the trailer, following references transitively
    pub fn reachable_objects(&self) -> BTreeSet<ObjectId> {
        let mut pending = Vec::new();
        Object::Dictionary(self.trailer.clone()).references(&mut pending);

        let mut seen = BTreeSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                object.references(&mut pending);
            }
        }
        seen.retain(|id| self.objects.contains_key(id));
        seen
    }

    pub(crate) fn drm_params(&self) -> &BTreeMap<String, String> {
        &self.drm_params
    }

    pub(crate) fn drm_params_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.drm_params
    }
}
