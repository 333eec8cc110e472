//! Frame-slot protocol over many simulated ticks.

use ash::vk;

use renderer_renderer::passes::{mesh_batches, resolve_bone_bindings};
use renderer_renderer::{
    BoneBinding, BoneBuffers, DrawItem, FrameCycle, FrameSlot, FrameStatus, MAX_FRAMES_IN_FLIGHT, MeshType,
    PresentStatus, RenderError, TransformPco,
};
use renderer_rhi::swapchain::{AcquireResult, PresentResult};

fn draw_item(mesh_type: MeshType) -> DrawItem {
    let bone_buffers = match mesh_type {
        MeshType::Static => None,
        MeshType::Skinned => Some(BoneBuffers::per_slot(
            [(vk::Buffer::null(), 64 * 128); MAX_FRAMES_IN_FLIGHT],
        )),
    };
    DrawItem {
        vertex_buffer: vk::Buffer::null(),
        index_buffer: vk::Buffer::null(),
        index_type: vk::IndexType::UINT32,
        mesh_type,
        transform: TransformPco::default(),
        submeshes: Vec::new(),
        bone_buffers,
    }
}

/// Drives one tick: wait, acquire `result`, and submit/present when acquired.
fn tick(cycle: &mut FrameCycle, result: AcquireResult) -> FrameStatus {
    cycle.fence_waited().unwrap();
    let status = cycle.acquired(result).unwrap();
    if let FrameStatus::Ready(_) = status {
        cycle.submitted().unwrap();
        cycle.presented(PresentResult::Presented).unwrap();
    }
    status
}

#[test]
fn test_slots_never_reused_before_fence_wait() {
    let mut cycle = FrameCycle::new();
    for frame in 0..100u32 {
        let slot = cycle.current_slot();
        // Before the wait the slot is either fresh or still in flight
        let pending_before = cycle.is_pending(slot);
        assert_eq!(pending_before, frame >= MAX_FRAMES_IN_FLIGHT as u32);

        cycle.fence_waited().unwrap();
        assert!(!cycle.is_pending(slot));

        cycle
            .acquired(AcquireResult::Acquired {
                image_index: frame % 3,
                suboptimal: false,
            })
            .unwrap();
        cycle.submitted().unwrap();
        assert!(cycle.is_pending(slot));
        cycle.presented(PresentResult::Presented).unwrap();
    }
    assert_eq!(cycle.presented_frames(), 100);
}

#[test]
fn test_slot_sequence_is_periodic() {
    let mut cycle = FrameCycle::new();
    let slots: Vec<usize> = (0..10)
        .map(|i| {
            let slot = cycle.current_slot().index();
            tick(
                &mut cycle,
                AcquireResult::Acquired {
                    image_index: i % 2,
                    suboptimal: false,
                },
            );
            slot
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn test_out_of_date_tick_keeps_slot() {
    let mut cycle = FrameCycle::new();
    tick(
        &mut cycle,
        AcquireResult::Acquired {
            image_index: 0,
            suboptimal: false,
        },
    );
    let slot = cycle.current_slot();

    assert_eq!(tick(&mut cycle, AcquireResult::OutOfDate), FrameStatus::Skip);
    assert_eq!(cycle.current_slot(), slot);
    assert!(!cycle.is_pending(slot));

    // The next tick reuses the same slot
    let status = tick(
        &mut cycle,
        AcquireResult::Acquired {
            image_index: 1,
            suboptimal: false,
        },
    );
    let FrameStatus::Ready(frame) = status else {
        panic!("expected an acquired frame");
    };
    assert_eq!(frame.slot, slot);
    assert_eq!(cycle.presented_frames(), 2);
    assert_eq!(cycle.skipped_frames(), 1);
}

#[test]
fn test_present_out_of_date_requests_recreate() {
    let mut cycle = FrameCycle::new();
    cycle.fence_waited().unwrap();
    cycle
        .acquired(AcquireResult::Acquired {
            image_index: 0,
            suboptimal: false,
        })
        .unwrap();
    cycle.submitted().unwrap();
    assert_eq!(
        cycle.presented(PresentResult::NeedsRecreate).unwrap(),
        PresentStatus::NeedsRecreate
    );
}

#[test]
fn test_batches_preserve_input_order() {
    let types = [
        MeshType::Static,
        MeshType::Static,
        MeshType::Skinned,
        MeshType::Static,
        MeshType::Skinned,
        MeshType::Skinned,
    ];
    let items: Vec<_> = types.iter().map(|t| draw_item(*t)).collect();
    let batches = mesh_batches(&items);

    assert_eq!(batches.len(), 4);
    let flattened: Vec<usize> = batches.iter().flat_map(|b| b.items.clone()).collect();
    assert_eq!(flattened, (0..items.len()).collect::<Vec<_>>());
    for batch in &batches {
        for index in batch.items.clone() {
            assert_eq!(items[index].mesh_type, batch.mesh_type);
        }
    }
}

#[test]
fn test_bone_buffers_follow_acquired_slot() {
    let items = vec![draw_item(MeshType::Static), draw_item(MeshType::Skinned)];
    for index in 0..MAX_FRAMES_IN_FLIGHT {
        let slot = FrameSlot::new(index);
        let bones = resolve_bone_bindings(&items, slot).unwrap();
        assert!(bones[0].is_none());
        assert_eq!(bones[1].map(|b| b.slot), Some(slot));
    }
}

#[test]
fn test_bone_buffer_for_other_slot_rejected() {
    let mut item = draw_item(MeshType::Skinned);
    let stale = BoneBinding {
        buffer: vk::Buffer::null(),
        range: 64,
        slot: FrameSlot::new(1),
    };
    item.bone_buffers = Some(BoneBuffers::from_bindings(vec![stale, stale]));

    let result = resolve_bone_bindings(&[item], FrameSlot::new(0));
    assert!(matches!(
        result,
        Err(RenderError::StaleBoneBuffer { expected, found })
            if expected == FrameSlot::new(0) && found == FrameSlot::new(1)
    ));
}

#[test]
fn test_skinned_item_without_bones_rejected() {
    let mut item = draw_item(MeshType::Skinned);
    item.bone_buffers = None;
    assert!(matches!(
        resolve_bone_bindings(&[item], FrameSlot::default()),
        Err(RenderError::MissingBoneBuffers(_))
    ));
}
