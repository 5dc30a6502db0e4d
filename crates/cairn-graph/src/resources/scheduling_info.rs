use cairn::format::{ColorFormat, ResourceFormat};
use cairn::state::{AccessFlags, ResourceState};
use cairn::Name;
use fxhash::FxHashMap;

use crate::graph::GraphError;
use crate::scheduler::ScheduleError;

///How one pass accesses one subresource.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SubresourceInfo {
    pub requested_state: ResourceState,
    ///Concrete format a typeless resource is viewed through in this pass.
    pub shader_visible_format: Option<ColorFormat>,
    pub access_flags: AccessFlags,
}

#[derive(Clone, Default, Debug)]
pub struct PassInfo {
    pub subresource_infos: Vec<Option<SubresourceInfo>>,
    pub needs_uav_barrier: bool,
    pub needs_aliasing_barrier: bool,
}

///Per-resource record of every pass touch of a frame. Filled by the resource scheduling
/// front-end, consumed by the transition planner and the aliasing memory planner.
pub struct SchedulingInfo {
    resource_name: Name,
    format: ResourceFormat,
    subresource_count: u32,

    pass_info: FxHashMap<Name, PassInfo>,
    ///Pass names in scheduling order, for deterministic plan construction.
    pass_order: Vec<Name>,

    expected_states: ResourceState,
    //One write per subresource per frame lets all read states collapse into a single combined
    // mask next to the single write state.
    combined_read_states: Vec<ResourceState>,
    write_states: Vec<ResourceState>,
    write_passes: Vec<Option<Name>>,

    pub heap_offset: u64,
    pub can_be_aliased: bool,
}

impl SchedulingInfo {
    pub fn new(resource_name: Name, format: ResourceFormat) -> Self {
        let subresource_count = format.subresource_count();
        SchedulingInfo {
            resource_name,
            format,
            subresource_count,
            pass_info: FxHashMap::default(),
            pass_order: Vec::new(),
            expected_states: ResourceState::COMMON,
            combined_read_states: Vec::new(),
            write_states: Vec::new(),
            write_passes: Vec::new(),
            heap_offset: 0,
            can_be_aliased: true,
        }
    }

    pub fn resource_name(&self) -> Name {
        self.resource_name
    }

    pub fn format(&self) -> &ResourceFormat {
        &self.format
    }

    pub fn subresource_count(&self) -> u32 {
        self.subresource_count
    }

    ///OR of every state any pass requested this frame.
    pub fn expected_states(&self) -> ResourceState {
        self.expected_states
    }

    pub fn info_for_pass(&self, pass: Name) -> Option<&PassInfo> {
        self.pass_info.get(&pass)
    }

    pub fn info_for_pass_mut(&mut self, pass: Name) -> Option<&mut PassInfo> {
        self.pass_info.get_mut(&pass)
    }

    ///Fetches or creates the per-pass record, sized for all subresources.
    pub fn allocate_info_for_pass(&mut self, pass: Name) -> &mut PassInfo {
        let subresource_count = self.subresource_count as usize;
        let entry = self.pass_info.entry(pass).or_insert_with(|| {
            PassInfo {
                subresource_infos: vec![None; subresource_count],
                ..PassInfo::default()
            }
        });
        if !self.pass_order.contains(&pass) {
            self.pass_order.push(pass);
        }
        entry
    }

    pub fn combined_read_states(&self, subresource_index: u32) -> ResourceState {
        debug_assert!(subresource_index < self.subresource_count);
        self.combined_read_states
            .get(subresource_index as usize)
            .copied()
            .unwrap_or(ResourceState::COMMON)
    }

    pub fn write_state(&self, subresource_index: u32) -> ResourceState {
        debug_assert!(subresource_index < self.subresource_count);
        self.write_states
            .get(subresource_index as usize)
            .copied()
            .unwrap_or(ResourceState::COMMON)
    }

    ///Folds all per-pass requests into expected states, combined read masks and the single
    /// write state per subresource.
    pub fn finish_scheduling(&mut self) -> Result<(), ScheduleError> {
        let mut expected_states = ResourceState::COMMON;

        self.combined_read_states =
            vec![ResourceState::COMMON; self.subresource_count as usize];
        self.write_states = vec![ResourceState::COMMON; self.subresource_count as usize];
        self.write_passes = vec![None; self.subresource_count as usize];

        for pass in self.pass_order.clone() {
            let info = self
                .pass_info
                .get_mut(&pass)
                .expect("pass order out of sync with pass info");

            for subresource_index in 0..self.subresource_count as usize {
                let Some(subresource_info) = &info.subresource_infos[subresource_index] else {
                    continue;
                };

                expected_states |= subresource_info.requested_state;

                if subresource_info
                    .requested_state
                    .contains(ResourceState::UNORDERED_ACCESS)
                {
                    info.needs_uav_barrier = true;
                }

                if subresource_info.requested_state.is_read_only() {
                    self.combined_read_states[subresource_index] |=
                        subresource_info.requested_state;
                } else {
                    if let Some(first_writer) = self.write_passes[subresource_index] {
                        return Err(ScheduleError::Graph(GraphError::MultipleWriters {
                            resource: self.resource_name,
                            subresource: subresource_index as u32,
                            first_writer,
                            second_writer: pass,
                        }));
                    }
                    self.write_states[subresource_index] = subresource_info.requested_state;
                    self.write_passes[subresource_index] = Some(pass);
                }
            }
        }

        self.expected_states = expected_states;
        Ok(())
    }

    ///Drops all per-frame pass records. Format and identity stay.
    pub fn clear_frame(&mut self) {
        self.pass_info.clear();
        self.pass_order.clear();
        self.expected_states = ResourceState::COMMON;
        self.combined_read_states.clear();
        self.write_states.clear();
        self.write_passes.clear();
        self.heap_offset = 0;
        self.can_be_aliased = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn::format::{Dimensions, FormatVariant, ResourceKind, TextureKind};

    fn texture_format(mips: u32) -> ResourceFormat {
        ResourceFormat {
            kind: ResourceKind::Texture(TextureKind::Texture2D),
            data_type: FormatVariant::Color(ColorFormat::Rgba16Float),
            dimensions: Dimensions::new_2d(128, 128),
            mip_count: mips,
        }
    }

    fn request(info: &mut SchedulingInfo, pass: &str, mip: u32, state: ResourceState) {
        let pass_info = info.allocate_info_for_pass(Name::new(pass));
        pass_info.subresource_infos[mip as usize] = Some(SubresourceInfo {
            requested_state: state,
            shader_visible_format: None,
            access_flags: AccessFlags::empty(),
        });
    }

    #[test]
    fn expected_states_or_all_requests() {
        let mut info = SchedulingInfo::new(Name::new("Color"), texture_format(1));
        request(&mut info, "Draw", 0, ResourceState::RENDER_TARGET);
        request(&mut info, "Post", 0, ResourceState::ANY_SHADER_ACCESS);
        info.finish_scheduling().unwrap();

        assert_eq!(
            info.expected_states(),
            ResourceState::RENDER_TARGET | ResourceState::ANY_SHADER_ACCESS
        );
    }

    #[test]
    fn reads_combine_and_write_stays_single() {
        let mut info = SchedulingInfo::new(Name::new("Depth"), texture_format(1));
        request(&mut info, "Prepass", 0, ResourceState::DEPTH_WRITE);
        request(
            &mut info,
            "Lighting",
            0,
            ResourceState::ANY_SHADER_ACCESS | ResourceState::DEPTH_READ,
        );
        request(&mut info, "Fog", 0, ResourceState::NON_PIXEL_SHADER_ACCESS);
        info.finish_scheduling().unwrap();

        assert_eq!(info.write_state(0), ResourceState::DEPTH_WRITE);
        assert_eq!(
            info.combined_read_states(0),
            ResourceState::ANY_SHADER_ACCESS | ResourceState::DEPTH_READ
        );
    }

    #[test]
    fn second_write_state_is_rejected() {
        let mut info = SchedulingInfo::new(Name::new("Target"), texture_format(1));
        request(&mut info, "First", 0, ResourceState::RENDER_TARGET);
        request(&mut info, "Second", 0, ResourceState::UNORDERED_ACCESS);

        assert!(matches!(
            info.finish_scheduling(),
            Err(ScheduleError::Graph(GraphError::MultipleWriters { .. }))
        ));
    }

    #[test]
    fn uav_request_flags_pass_for_uav_barriers() {
        let mut info = SchedulingInfo::new(Name::new("Scratch"), texture_format(2));
        request(&mut info, "Blur", 1, ResourceState::UNORDERED_ACCESS);
        request(&mut info, "Sample", 0, ResourceState::ANY_SHADER_ACCESS);
        info.finish_scheduling().unwrap();

        assert!(info.info_for_pass(Name::new("Blur")).unwrap().needs_uav_barrier);
        assert!(!info.info_for_pass(Name::new("Sample")).unwrap().needs_uav_barrier);
    }

    #[test]
    fn writes_to_distinct_mips_are_allowed() {
        let mut info = SchedulingInfo::new(Name::new("Chain"), texture_format(2));
        request(&mut info, "Mip0", 0, ResourceState::UNORDERED_ACCESS);
        request(&mut info, "Mip1", 1, ResourceState::UNORDERED_ACCESS);
        assert!(info.finish_scheduling().is_ok());
    }
}
