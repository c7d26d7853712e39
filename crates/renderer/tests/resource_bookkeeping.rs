//! Integration tests for the device-independent bookkeeping of the renderer.

use std::cell::Cell;
use std::rc::Rc;

use ash::vk;

use ember_renderer::bindless::{FIRST_FREE_SLOT, MAX_BINDLESS_TEXTURES, SlotRegistry};
use ember_renderer::frame::{FRAME_OVERLAP, FrameRing};
use ember_renderer::material::{DEFAULT_TEMPLATE, TemplateCache, template_name};
use ember_renderer::postprocess::{ChainImage, PostprocessChain, set_for_pass};
use ember_rhi::deletion_queue::DeletionQueue;
use ember_rhi::descriptor::{PoolRing, PoolSizeRatio};
use ember_scene::MaterialPass;

/// Live count of fake constants buffers and descriptor pools.
#[derive(Default)]
struct Live {
    buffers: Cell<usize>,
    pools: Cell<usize>,
}

struct FakeBuffer(Rc<Live>);

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        self.0.buffers.set(self.0.buffers.get() - 1);
    }
}

/// Material storage of one loaded scene: a buffer queue and a pool ring,
/// both released when the scene goes away.
struct SceneMaterials {
    buffers: DeletionQueue,
    pools: PoolRing<u32>,
    live: Rc<Live>,
}

impl SceneMaterials {
    fn new(live: &Rc<Live>) -> Self {
        live.pools.set(live.pools.get() + 1);
        let ratios = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)];
        Self {
            buffers: DeletionQueue::new(),
            pools: PoolRing::new(0, 4, &ratios),
            live: Rc::clone(live),
        }
    }

    fn build_material(&mut self) {
        let live = &self.live;
        live.buffers.set(live.buffers.get() + 1);
        self.buffers.push_drop(FakeBuffer(Rc::clone(live)));

        self.pools
            .allocate(
                |_, _| {
                    live.pools.set(live.pools.get() + 1);
                    Ok(live.pools.get() as u32)
                },
                |_| Ok(()),
            )
            .unwrap();
    }
}

impl Drop for SceneMaterials {
    fn drop(&mut self) {
        self.buffers.flush();
        let pools = self.pools.drain().count();
        self.live.pools.set(self.live.pools.get() - pools);
    }
}

#[test]
fn test_scene_reload_reuses_texture_slots() {
    let mut slots = SlotRegistry::new(MAX_BINDLESS_TEXTURES, FIRST_FREE_SLOT);

    // Streaming the same scene in and out must not grow the array.
    for _ in 0..100 {
        let scene: Vec<u32> = (0..32).map(|_| slots.acquire().unwrap()).collect();
        assert!(scene.iter().all(|&slot| slot >= FIRST_FREE_SLOT));
        for slot in scene {
            slots.release(slot);
        }
    }
    assert_eq!(slots.high_water_mark(), FIRST_FREE_SLOT + 32);
    assert_eq!(slots.in_use(), FIRST_FREE_SLOT);
}

#[test]
fn test_scene_reload_releases_material_storage() {
    let live = Rc::new(Live::default());
    let mut current: Option<SceneMaterials> = None;

    for _ in 0..50 {
        let mut scene = SceneMaterials::new(&live);
        for _ in 0..3 {
            scene.build_material();
        }
        // The replaced scene takes its buffers and pools with it.
        drop(current.replace(scene));
        assert_eq!(live.buffers.get(), 3);
        assert_eq!(live.pools.get(), 1);
    }

    drop(current);
    assert_eq!(live.buffers.get(), 0);
    assert_eq!(live.pools.get(), 0);
}

#[test]
fn test_every_pass_resolves_to_a_template() {
    let mut cache = TemplateCache::new();
    cache.register(DEFAULT_TEMPLATE, "opaque pipeline");

    for pass in [MaterialPass::MainColor, MaterialPass::Transparent, MaterialPass::Other] {
        assert!(cache.get_or_default(template_name(pass)).is_some());
    }
}

#[test]
fn test_frame_resources_released_after_overlap() {
    // Each slot collects resources retired while it is current. They are
    // released the next time the slot comes around, FRAME_OVERLAP frames
    // later.
    let mut ring = FrameRing::new(|_| Ok::<Vec<u64>, ()>(Vec::new())).unwrap();
    let mut released = Vec::new();

    for _ in 0..6 {
        let frame = ring.frame_number();
        released.extend(ring.current_mut().drain(..).map(|retired| (retired, frame)));
        ring.current_mut().push(frame);
        ring.advance();
    }

    assert_eq!(released.len(), 4);
    for (retired, freed) in released {
        assert_eq!(freed - retired, FRAME_OVERLAP as u64);
    }
}

#[test]
fn test_postprocess_result_location() {
    for passes in 0..6 {
        let expected = if passes == 0 {
            ChainImage::Draw
        } else if set_for_pass(passes - 1) == 0 {
            ChainImage::Postprocess
        } else {
            ChainImage::Draw
        };
        assert_eq!(PostprocessChain::final_image(passes), expected);
    }
}
