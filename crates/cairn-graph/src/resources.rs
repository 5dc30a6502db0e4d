use ahash::AHashMap;
use cairn::format::{BufferProperties, ClearValue, HeapKind, ResourceFormat};
use cairn::upload::VersionedQueue;
use cairn::Name;
use fxhash::FxHashMap;
use slotmap::SlotMap;

use crate::scheduler::{ScheduleAction, ScheduleError};

pub(crate) mod aliasing;
pub mod scheduling_info;

pub use scheduling_info::{PassInfo, SchedulingInfo, SubresourceInfo};

slotmap::new_key_type! {
    ///Key of a texture allocation owned by the store.
    pub struct TextureKey;
}
slotmap::new_key_type! {
    ///Key of a buffer allocation owned by the store.
    pub struct BufferKey;
}

///A texture the store has allocated for a scheduled resource.
pub struct TextureAllocation {
    pub name: Name,
    pub format: ResourceFormat,
    pub clear_value: Option<ClearValue>,
}

pub struct BufferAllocation {
    pub name: Name,
    pub properties: BufferProperties,
    pub heap: HeapKind,
}

///A CPU-visible staging buffer handed out by the store's upload/readback lanes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StagingBuffer {
    pub id: u64,
    pub size: u64,
}

///Everything the store tracks per resource name.
pub struct ResourceEntry {
    pub scheduling_info: SchedulingInfo,
    pub texture: Option<TextureKey>,
    pub buffer: Option<BufferKey>,

    clear_value: Option<ClearValue>,
    buffer_properties: Option<BufferProperties>,
    heap: Option<HeapKind>,

    uploads: VersionedQueue<StagingBuffer>,
    readbacks: VersionedQueue<StagingBuffer>,
}

impl ResourceEntry {
    fn new(scheduling_info: SchedulingInfo) -> Self {
        ResourceEntry {
            scheduling_info,
            texture: None,
            buffer: None,
            clear_value: None,
            buffer_properties: None,
            heap: None,
            uploads: VersionedQueue::new(),
            readbacks: VersionedQueue::new(),
        }
    }
}

///Owns all schedulable resources: their [SchedulingInfo], the backing allocations once created,
/// aliasing placement and the frame-versioned staging lanes.
///
/// The store never talks to the GPU itself; allocations are logical records a backend binds to
/// real memory.
pub struct ResourceStore {
    entries: FxHashMap<Name, ResourceEntry>,
    ///Creation order, for deterministic scheduling/allocation sweeps.
    entry_order: Vec<Name>,

    textures: SlotMap<TextureKey, TextureAllocation>,
    buffers: SlotMap<BufferKey, BufferAllocation>,

    aliased_predecessors: FxHashMap<Name, Name>,
    heap_size: u64,

    next_staging_id: u64,
    frame: u64,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        ResourceStore {
            entries: FxHashMap::default(),
            entry_order: Vec::new(),
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            aliased_predecessors: FxHashMap::default(),
            heap_size: 0,
            next_staging_id: 0,
            frame: 0,
        }
    }

    ///Starts a new frame: wipes per-frame scheduling state, keeps allocations.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
        self.aliased_predecessors.clear();
        for entry in self.entries.values_mut() {
            entry.scheduling_info.clear_frame();
            entry.uploads.begin_frame(frame);
            entry.readbacks.begin_frame(frame);
        }
    }

    ///Retires staging buffers of all frames up to `frame`.
    pub fn end_frame(&mut self, frame: u64) {
        for entry in self.entries.values_mut() {
            entry.uploads.end_frame(frame);
            entry.readbacks.end_frame(frame);
        }
    }

    ///Registers a texture resource if it is not known yet and applies the scheduling action.
    /// Re-declaring an existing resource reuses the prior allocation.
    pub fn queue_texture_allocation(
        &mut self,
        name: Name,
        format: ResourceFormat,
        clear_value: Option<ClearValue>,
        action: ScheduleAction,
    ) -> Result<(), ScheduleError> {
        let entry = self.entries.entry(name).or_insert_with(|| {
            let mut entry = ResourceEntry::new(SchedulingInfo::new(name, format));
            entry.clear_value = clear_value;
            entry
        });
        if !self.entry_order.contains(&name) {
            self.entry_order.push(name);
        }

        action.apply(&mut entry.scheduling_info)
    }

    pub fn queue_buffer_allocation(
        &mut self,
        name: Name,
        format: ResourceFormat,
        properties: BufferProperties,
        heap: HeapKind,
        action: ScheduleAction,
    ) -> Result<(), ScheduleError> {
        let entry = self.entries.entry(name).or_insert_with(|| {
            let mut entry = ResourceEntry::new(SchedulingInfo::new(name, format));
            entry.buffer_properties = Some(properties);
            entry.heap = Some(heap);
            entry
        });
        if !self.entry_order.contains(&name) {
            self.entry_order.push(name);
        }

        action.apply(&mut entry.scheduling_info)
    }

    ///Applies a scheduling action to an already declared resource.
    pub fn queue_resource_usage(
        &mut self,
        name: Name,
        action: ScheduleAction,
    ) -> Result<(), ScheduleError> {
        let entry = self
            .entries
            .get_mut(&name)
            .ok_or(ScheduleError::UnknownResource(name))?;
        action.apply(&mut entry.scheduling_info)
    }

    pub fn subresource_count(&self, name: Name) -> Result<u32, ScheduleError> {
        self.entries
            .get(&name)
            .map(|entry| entry.scheduling_info.subresource_count())
            .ok_or(ScheduleError::UnknownResource(name))
    }

    ///Finalizes all scheduling infos and runs the aliasing memory planner over the frame's
    /// usage timelines. `first_users` maps each resource to the pass that uses it first, so the
    /// aliasing barrier flag lands on the right pass record.
    pub fn finish_scheduling(
        &mut self,
        timelines: &FxHashMap<Name, (u64, u64)>,
        first_users: &AHashMap<Name, Name>,
    ) -> Result<(), ScheduleError> {
        let mut candidates = Vec::new();

        for name in &self.entry_order {
            let entry = self
                .entries
                .get_mut(name)
                .expect("entry order out of sync with entries");
            entry.scheduling_info.finish_scheduling()?;

            //Resources untouched this frame keep their memory but take no part in aliasing.
            if let Some((first_use, last_use)) = timelines.get(name).copied() {
                candidates.push(aliasing::AliasingCandidate {
                    name: *name,
                    footprint: entry.scheduling_info.format().footprint(),
                    can_be_aliased: entry.scheduling_info.can_be_aliased,
                    first_use,
                    last_use,
                });
            }
        }

        let assignment = aliasing::assign_heap_offsets(candidates);
        self.heap_size = assignment.heap_size;
        self.aliased_predecessors = assignment.predecessors;

        for (name, offset) in assignment.offsets {
            let entry = self.entries.get_mut(&name).expect("planned unknown resource");
            entry.scheduling_info.heap_offset = offset;
        }

        for name in self.aliased_predecessors.keys() {
            let Some(first_user) = first_users.get(name) else {
                continue;
            };
            let entry = self.entries.get_mut(name).expect("planned unknown resource");
            if let Some(pass_info) = entry.scheduling_info.info_for_pass_mut(*first_user) {
                pass_info.needs_aliasing_barrier = true;
            }
        }

        Ok(())
    }

    ///Creates backing allocations for every declared resource that has none yet.
    pub fn allocate(&mut self) {
        for name in &self.entry_order {
            let entry = self
                .entries
                .get_mut(name)
                .expect("entry order out of sync with entries");

            if entry.buffer_properties.is_some() {
                if entry.buffer.is_none() {
                    let key = self.buffers.insert(BufferAllocation {
                        name: *name,
                        properties: entry.buffer_properties.unwrap(),
                        heap: entry.heap.unwrap_or(HeapKind::Default),
                    });
                    entry.buffer = Some(key);
                }
            } else if entry.texture.is_none() {
                let key = self.textures.insert(TextureAllocation {
                    name: *name,
                    format: *entry.scheduling_info.format(),
                    clear_value: entry.clear_value,
                });
                entry.texture = Some(key);
            }
        }
    }

    pub fn get(&self, name: Name) -> Option<&ResourceEntry> {
        self.entries.get(&name)
    }

    pub fn texture(&self, key: TextureKey) -> Option<&TextureAllocation> {
        self.textures.get(key)
    }

    pub fn buffer(&self, key: BufferKey) -> Option<&BufferAllocation> {
        self.buffers.get(key)
    }

    ///The resource whose memory `name` reuses this frame, if any.
    pub fn aliased_predecessor(&self, name: Name) -> Option<Name> {
        self.aliased_predecessors.get(&name).copied()
    }

    pub fn heap_size(&self) -> u64 {
        self.heap_size
    }

    ///Requests an upload staging buffer for `name` in the current frame. Idempotent per frame.
    pub fn request_write(&mut self, name: Name) -> Result<(), ScheduleError> {
        let size = self.entry_footprint(name)?;
        let Self {
            entries,
            next_staging_id,
            ..
        } = self;
        let entry = entries
            .get_mut(&name)
            .ok_or(ScheduleError::UnknownResource(name))?;
        entry.uploads.request(|| {
            *next_staging_id += 1;
            StagingBuffer {
                id: *next_staging_id,
                size,
            }
        });
        Ok(())
    }

    ///Requests a readback staging buffer for `name` in the current frame. Idempotent per frame.
    pub fn request_read(&mut self, name: Name) -> Result<(), ScheduleError> {
        let size = self.entry_footprint(name)?;
        let Self {
            entries,
            next_staging_id,
            ..
        } = self;
        let entry = entries
            .get_mut(&name)
            .ok_or(ScheduleError::UnknownResource(name))?;
        entry.readbacks.request(|| {
            *next_staging_id += 1;
            StagingBuffer {
                id: *next_staging_id,
                size,
            }
        });
        Ok(())
    }

    pub fn current_upload_buffer(&self, name: Name) -> Option<&StagingBuffer> {
        self.entries.get(&name).and_then(|entry| entry.uploads.current())
    }

    pub fn completed_upload_buffer(&self, name: Name) -> Option<&StagingBuffer> {
        self.entries.get(&name).and_then(|entry| entry.uploads.completed())
    }

    pub fn current_readback_buffer(&self, name: Name) -> Option<&StagingBuffer> {
        self.entries
            .get(&name)
            .and_then(|entry| entry.readbacks.current())
    }

    pub fn completed_readback_buffer(&self, name: Name) -> Option<&StagingBuffer> {
        self.entries
            .get(&name)
            .and_then(|entry| entry.readbacks.completed())
    }

    fn entry_footprint(&self, name: Name) -> Result<u64, ScheduleError> {
        let entry = self
            .entries
            .get(&name)
            .ok_or(ScheduleError::UnknownResource(name))?;
        Ok(entry
            .buffer_properties
            .map(|properties| properties.size)
            .unwrap_or_else(|| entry.scheduling_info.format().footprint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn::format::{ColorFormat, Dimensions, FormatVariant, ResourceKind, TextureKind};

    fn format() -> ResourceFormat {
        ResourceFormat {
            kind: ResourceKind::Texture(TextureKind::Texture2D),
            data_type: FormatVariant::Color(ColorFormat::Rgba8Unorm),
            dimensions: Dimensions::new_2d(16, 16),
            mip_count: 1,
        }
    }

    fn new_texture_action(pass: &str) -> ScheduleAction {
        ScheduleAction::NewTexture {
            pass: Name::new(pass),
            can_be_aliased: true,
            shader_visible_format: None,
        }
    }

    #[test]
    fn redeclaring_reuses_the_entry() {
        let mut store = ResourceStore::new();
        let name = Name::new("Scratch");

        store
            .queue_texture_allocation(name, format(), None, new_texture_action("A"))
            .unwrap();
        store.allocate();
        let first_key = store.get(name).unwrap().texture;

        store.begin_frame(2);
        store
            .queue_texture_allocation(name, format(), None, new_texture_action("A"))
            .unwrap();
        store.allocate();

        assert_eq!(store.get(name).unwrap().texture, first_key);
        assert_eq!(store.entry_order.len(), 1);
    }

    #[test]
    fn usage_of_undeclared_resource_fails() {
        let mut store = ResourceStore::new();
        let err = store
            .queue_resource_usage(
                Name::new("Ghost"),
                ScheduleAction::ReadTexture {
                    pass: Name::new("P"),
                    mips: vec![0],
                    concrete_format: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownResource(_)));
    }

    #[test]
    fn upload_lane_follows_frame_versioning() {
        let mut store = ResourceStore::new();
        let name = Name::new("Constants");

        store.begin_frame(5);
        store
            .queue_texture_allocation(name, format(), None, new_texture_action("A"))
            .unwrap();

        store.request_write(name).unwrap();
        let first = *store.current_upload_buffer(name).unwrap();
        store.request_write(name).unwrap();
        assert_eq!(store.current_upload_buffer(name), Some(&first));

        store.end_frame(5);
        store.begin_frame(6);
        assert_eq!(store.current_upload_buffer(name), None);
        assert_eq!(store.completed_upload_buffer(name), Some(&first));

        store.request_write(name).unwrap();
        assert_ne!(store.current_upload_buffer(name), Some(&first));
    }
}
