use cairn::Name;
use fxhash::FxHashMap;

///One resource the planner has to place: its memory footprint, whether it may share memory at
/// all, and its usage timeline in global execution indices.
pub(crate) struct AliasingCandidate {
    pub name: Name,
    pub footprint: u64,
    pub can_be_aliased: bool,
    pub first_use: u64,
    pub last_use: u64,
}

pub(crate) struct AliasingAssignment {
    pub offsets: FxHashMap<Name, u64>,
    ///For every resource placed into a previously used region: the resource that held the
    /// region last. These are the spots needing aliasing barriers.
    pub predecessors: FxHashMap<Name, Name>,
    pub heap_size: u64,
}

struct Region {
    offset: u64,
    size: u64,
    ///Global index after which the region is free again. `u64::MAX` pins the region forever
    /// (non-aliasable occupants).
    free_after: u64,
    occupant: Name,
}

///Greedy first-fit placement over usage timelines. Two resources end up in the same region only
/// if their timelines are disjoint.
pub(crate) fn assign_heap_offsets(mut candidates: Vec<AliasingCandidate>) -> AliasingAssignment {
    candidates.sort_by_key(|candidate| (candidate.first_use, candidate.name.id()));

    let mut regions: Vec<Region> = Vec::new();
    let mut assignment = AliasingAssignment {
        offsets: FxHashMap::default(),
        predecessors: FxHashMap::default(),
        heap_size: 0,
    };

    for candidate in candidates {
        let reusable = if candidate.can_be_aliased {
            regions.iter_mut().find(|region| {
                region.free_after < candidate.first_use && region.size >= candidate.footprint
            })
        } else {
            None
        };

        if let Some(region) = reusable {
            assignment.offsets.insert(candidate.name, region.offset);
            assignment
                .predecessors
                .insert(candidate.name, region.occupant);

            #[cfg(feature = "logging")]
            log::trace!(
                "Aliasing {} over {} at heap offset {}",
                candidate.name,
                region.occupant,
                region.offset
            );

            region.occupant = candidate.name;
            region.free_after = candidate.last_use;
        } else {
            let offset = assignment.heap_size;
            assignment.offsets.insert(candidate.name, offset);
            regions.push(Region {
                offset,
                size: candidate.footprint,
                free_after: if candidate.can_be_aliased {
                    candidate.last_use
                } else {
                    u64::MAX
                },
                occupant: candidate.name,
            });
            assignment.heap_size += candidate.footprint;
        }
    }

    assignment
}
