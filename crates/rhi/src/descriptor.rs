//! Descriptor set layouts, writes and growable allocation.
//!
//! # Overview
//!
//! - [`DescriptorLayoutBuilder`] collects bindings and builds a
//!   [`DescriptorSetLayout`], OR-ing the shader stages into every binding
//! - [`DescriptorWriter`] batches image/buffer writes and applies them to a set
//! - [`DescriptorAllocatorGrowable`] hands out sets from a list of pools and
//!   creates larger pools when the current ones run out
//! - [`DescriptorPool`] is a single fixed pool, used where sets need special
//!   pool flags (the bindless texture array)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::descriptor::{
//!     DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorWriter, PoolSizeRatio,
//! };
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> ember_rhi::RhiResult<()> {
//! let layout = DescriptorLayoutBuilder::new()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
//!     .build(
//!         device.clone(),
//!         vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
//!         vk::DescriptorSetLayoutCreateFlags::empty(),
//!     )?;
//!
//! let mut allocator = DescriptorAllocatorGrowable::new(
//!     device.clone(),
//!     10,
//!     &[PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)],
//! )?;
//! let set = allocator.allocate(layout.handle())?;
//!
//! let mut writer = DescriptorWriter::new();
//! writer.write_buffer(0, ubo, 256, 0, vk::DescriptorType::UNIFORM_BUFFER);
//! writer.update_set(&device, set);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Upper bound on the set count of any pool the growable allocator creates.
pub const MAX_SETS_PER_POOL: u32 = 4092;

/// Growth factor applied to the pool size after each new pool.
const POOL_GROWTH: f32 = 1.5;

/// Set count for the pool created after one of `current` sets.
#[inline]
pub fn grow_sets_per_pool(current: u32) -> u32 {
    ((current as f32 * POOL_GROWTH) as u32).min(MAX_SETS_PER_POOL)
}

/// Relative capacity of one descriptor type per set in a pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Pool sizes for a pool holding `set_count` sets.
pub fn pool_sizes(ratios: &[PoolSizeRatio], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| vk::DescriptorPoolSize {
            ty: r.ty,
            descriptor_count: (r.ratio * set_count as f32) as u32,
        })
        .collect()
}

#[inline]
fn is_pool_exhausted(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
    )
}

/// Ready/full bookkeeping and growth policy, independent of how pools are made.
///
/// `P` is a pool handle. Pools are taken from the back of `ready` and pushed
/// back after every successful allocation; a pool moves to `full` only when an
/// allocation from it fails with pool exhaustion.
#[derive(Debug)]
pub struct PoolRing<P> {
    ratios: Vec<PoolSizeRatio>,
    ready: Vec<P>,
    full: Vec<P>,
    sets_per_pool: u32,
}

impl<P: Copy> PoolRing<P> {
    /// Starts with `initial`, a pool of `max_sets` sets.
    pub fn new(initial: P, max_sets: u32, ratios: &[PoolSizeRatio]) -> Self {
        Self {
            ratios: ratios.to_vec(),
            ready: vec![initial],
            full: Vec::new(),
            sets_per_pool: grow_sets_per_pool(max_sets),
        }
    }

    #[inline]
    pub fn ratios(&self) -> &[PoolSizeRatio] {
        &self.ratios
    }

    /// Set count the next newly created pool will have.
    #[inline]
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    #[inline]
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    #[inline]
    pub fn full_count(&self) -> usize {
        self.full.len()
    }

    fn take_pool<C>(&mut self, create: &mut C) -> RhiResult<P>
    where
        C: FnMut(u32, &[PoolSizeRatio]) -> RhiResult<P>,
    {
        if let Some(pool) = self.ready.pop() {
            return Ok(pool);
        }
        let pool = create(self.sets_per_pool, &self.ratios)?;
        debug!("Created descriptor pool with {} sets", self.sets_per_pool);
        self.sets_per_pool = grow_sets_per_pool(self.sets_per_pool);
        Ok(pool)
    }

    /// Runs `try_allocate` against a ready pool, retiring it and retrying once
    /// with another (possibly new) pool on exhaustion.
    ///
    /// # Errors
    /// [`RhiError::DescriptorPoolExhausted`] if the retry also fails, or any
    /// error from `create`/`try_allocate` that is not pool exhaustion.
    pub fn allocate<T, C, A>(&mut self, mut create: C, mut try_allocate: A) -> RhiResult<T>
    where
        C: FnMut(u32, &[PoolSizeRatio]) -> RhiResult<P>,
        A: FnMut(P) -> Result<T, vk::Result>,
    {
        let mut pool = self.take_pool(&mut create)?;

        let value = match try_allocate(pool) {
            Ok(value) => value,
            Err(result) if is_pool_exhausted(result) => {
                self.full.push(pool);
                pool = self.take_pool(&mut create)?;
                match try_allocate(pool) {
                    Ok(value) => value,
                    Err(result) => {
                        self.ready.push(pool);
                        return Err(RhiError::DescriptorPoolExhausted(result));
                    }
                }
            }
            Err(result) => {
                self.ready.push(pool);
                return Err(result.into());
            }
        };

        self.ready.push(pool);
        Ok(value)
    }

    /// Resets every pool and returns all of them to the ready list.
    pub fn clear<R>(&mut self, mut reset: R) -> RhiResult<()>
    where
        R: FnMut(P) -> RhiResult<()>,
    {
        for &pool in &self.ready {
            reset(pool)?;
        }
        for pool in self.full.drain(..) {
            reset(pool)?;
            self.ready.push(pool);
        }
        Ok(())
    }

    /// Removes and yields every pool, ready and full.
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.ready.drain(..).chain(self.full.drain(..))
    }
}

/// Descriptor set layout with automatic cleanup.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from raw bindings.
    ///
    /// `binding_flags` is either empty or has one entry per binding.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<Self> {
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(binding_flags);
        let mut create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(bindings)
            .flags(flags);
        if !binding_flags.is_empty() {
            create_info = create_info.push_next(&mut flags_info);
        }

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Accumulates layout bindings; stages are applied at build time.
#[derive(Default, Clone)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-descriptor binding.
    pub fn add_binding(self, binding: u32, ty: vk::DescriptorType) -> Self {
        self.add_binding_array(binding, ty, 1, vk::DescriptorBindingFlags::empty())
    }

    /// Adds an arrayed binding with descriptor-indexing flags.
    pub fn add_binding_array(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        count: u32,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(count),
        );
        self.binding_flags.push(flags);
        self
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.binding_flags.clear();
    }

    /// Bindings with `stages` OR-ed into each.
    pub fn bindings_with_stages(
        &self,
        stages: vk::ShaderStageFlags,
    ) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .iter()
            .map(|b| {
                let stage_flags = b.stage_flags | stages;
                b.stage_flags(stage_flags)
            })
            .collect()
    }

    /// Creates the layout.
    ///
    /// # Errors
    /// Returns an error if `vkCreateDescriptorSetLayout` fails.
    pub fn build(
        &self,
        device: Arc<Device>,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<DescriptorSetLayout> {
        let bindings = self.bindings_with_stages(stages);
        let binding_flags: &[vk::DescriptorBindingFlags] =
            if self.binding_flags.iter().all(|f| f.is_empty()) {
                &[]
            } else {
                &self.binding_flags
            };
        DescriptorSetLayout::new(device, &bindings, binding_flags, flags)
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteSource {
    Image(usize),
    Buffer(usize),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    array_element: u32,
    ty: vk::DescriptorType,
    source: WriteSource,
}

/// Batches descriptor writes for a single `vkUpdateDescriptorSets` call.
#[derive(Default)]
pub struct DescriptorWriter {
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.write_image_element(binding, 0, view, sampler, layout, ty)
    }

    /// Writes one element of an arrayed image binding.
    pub fn write_image_element(
        &mut self,
        binding: u32,
        array_element: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.image_infos.push(
            vk::DescriptorImageInfo::default()
                .sampler(sampler)
                .image_view(view)
                .image_layout(layout),
        );
        self.writes.push(PendingWrite {
            binding,
            array_element,
            ty,
            source: WriteSource::Image(self.image_infos.len() - 1),
        });
        self
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.buffer_infos.push(
            vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(size),
        );
        self.writes.push(PendingWrite {
            binding,
            array_element: 0,
            ty,
            source: WriteSource::Buffer(self.buffer_infos.len() - 1),
        });
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn clear(&mut self) {
        self.image_infos.clear();
        self.buffer_infos.clear();
        self.writes.clear();
    }

    /// Applies every pending write to `set`. The writer keeps its contents.
    pub fn update_set(&self, device: &Device, set: vk::DescriptorSet) {
        if self.writes.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|w| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_element)
                    .descriptor_type(w.ty);
                match w.source {
                    WriteSource::Image(i) => {
                        write.image_info(std::slice::from_ref(&self.image_infos[i]))
                    }
                    WriteSource::Buffer(i) => {
                        write.buffer_info(std::slice::from_ref(&self.buffer_infos[i]))
                    }
                }
            })
            .collect();

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Growable descriptor allocator over a ring of `VkDescriptorPool`s.
///
/// Pools are never freed individually; [`clear_pools`](Self::clear_pools)
/// resets them all at once, which is how per-frame allocators recycle their
/// transient sets.
pub struct DescriptorAllocatorGrowable {
    device: Arc<Device>,
    ring: PoolRing<vk::DescriptorPool>,
}

impl DescriptorAllocatorGrowable {
    /// Creates the allocator with one initial pool of `max_sets` sets.
    pub fn new(device: Arc<Device>, max_sets: u32, ratios: &[PoolSizeRatio]) -> RhiResult<Self> {
        let initial = create_raw_pool(&device, max_sets, ratios)?;
        debug!(
            "Descriptor allocator created: {} initial sets, {} type ratio(s)",
            max_sets,
            ratios.len()
        );
        Ok(Self {
            ring: PoolRing::new(initial, max_sets, ratios),
            device,
        })
    }

    /// Allocates one set of `layout`.
    ///
    /// # Errors
    /// Returns [`RhiError::DescriptorPoolExhausted`] if a freshly grown pool
    /// still cannot satisfy the request.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let device = &self.device;
        let layouts = [layout];
        self.ring.allocate(
            |set_count, ratios| create_raw_pool(device, set_count, ratios),
            |pool| {
                let info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts);
                unsafe { device.handle().allocate_descriptor_sets(&info) }.map(|sets| sets[0])
            },
        )
    }

    /// Resets all pools; every set handed out so far becomes invalid.
    pub fn clear_pools(&mut self) -> RhiResult<()> {
        let device = &self.device;
        self.ring.clear(|pool| {
            unsafe {
                device
                    .handle()
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
            Ok(())
        })
    }

    /// Destroys all pools. The allocator stays usable and will create a new
    /// pool on the next allocation.
    pub fn destroy_pools(&mut self) {
        let device = self.device.clone();
        let mut count = 0;
        for pool in self.ring.drain() {
            unsafe { device.handle().destroy_descriptor_pool(pool, None) };
            count += 1;
        }
        if count > 0 {
            debug!("Destroyed {} descriptor pool(s)", count);
        }
    }

    #[inline]
    pub fn pool_count(&self) -> usize {
        self.ring.ready_count() + self.ring.full_count()
    }
}

impl Drop for DescriptorAllocatorGrowable {
    fn drop(&mut self) {
        self.destroy_pools();
    }
}

fn create_raw_pool(
    device: &Device,
    set_count: u32,
    ratios: &[PoolSizeRatio],
) -> RhiResult<vk::DescriptorPool> {
    let sizes = pool_sizes(ratios, set_count);
    let info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(set_count)
        .pool_sizes(&sizes);
    let pool = unsafe { device.handle().create_descriptor_pool(&info, None)? };
    Ok(pool)
}

/// A single descriptor pool with explicit creation flags.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Created descriptor pool: max_sets={} flags={:?}", max_sets, flags);

        Ok(Self { device, pool })
    }

    /// Allocates one set whose last binding is a variable-count array of
    /// `variable_count` descriptors.
    pub fn allocate_variable(
        &self,
        layout: vk::DescriptorSetLayout,
        variable_count: u32,
    ) -> RhiResult<vk::DescriptorSet> {
        let counts = [variable_count];
        let layouts = [layout];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
                .descriptor_counts(&counts);
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_info);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }
            .inspect_err(|e| warn!("Variable descriptor allocation failed: {:?}", e))?;
        Ok(sets[0])
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory pool model: each pool has a capacity and a used count.
    #[derive(Default)]
    struct FakePools {
        capacity: Vec<u32>,
        used: Vec<u32>,
    }

    impl FakePools {
        fn create(&mut self, set_count: u32) -> usize {
            self.capacity.push(set_count);
            self.used.push(0);
            self.capacity.len() - 1
        }

        fn try_allocate(&mut self, pool: usize) -> Result<usize, vk::Result> {
            if self.used[pool] >= self.capacity[pool] {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            self.used[pool] += 1;
            Ok(pool)
        }
    }

    fn ratios() -> Vec<PoolSizeRatio> {
        vec![
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.5),
        ]
    }

    fn allocate(ring: &mut PoolRing<usize>, pools: &mut FakePools) -> RhiResult<usize> {
        let cell = std::cell::RefCell::new(pools);
        ring.allocate(
            |n, _| Ok(cell.borrow_mut().create(n)),
            |p| cell.borrow_mut().try_allocate(p),
        )
    }

    #[test]
    fn test_grow_sets_per_pool() {
        assert_eq!(grow_sets_per_pool(10), 15);
        assert_eq!(grow_sets_per_pool(1000), 1500);
        assert_eq!(grow_sets_per_pool(3000), MAX_SETS_PER_POOL);
        assert_eq!(grow_sets_per_pool(MAX_SETS_PER_POOL), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_pool_sizes_scale_with_set_count() {
        let sizes = pool_sizes(&ratios(), 10);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(sizes[0].descriptor_count, 30);
        assert_eq!(sizes[1].descriptor_count, 15);
    }

    #[test]
    fn test_initial_growth_is_one_and_a_half() {
        let ring = PoolRing::new(0usize, 1000, &ratios());
        assert_eq!(ring.sets_per_pool(), 1500);
        assert_eq!(ring.ready_count(), 1);
        assert_eq!(ring.full_count(), 0);
    }

    #[test]
    fn test_overflow_triggers_single_regrowth() {
        let mut pools = FakePools::default();
        let initial = pools.create(10);
        let mut ring = PoolRing::new(initial, 10, &ratios());

        for _ in 0..10 {
            assert_eq!(allocate(&mut ring, &mut pools).unwrap(), initial);
        }
        assert_eq!(pools.capacity.len(), 1);

        // The eleventh set retires the first pool and grows exactly once.
        let pool = allocate(&mut ring, &mut pools).unwrap();
        assert_eq!(pool, 1);
        assert_eq!(pools.capacity, vec![10, 15]);
        assert_eq!(ring.full_count(), 1);
        assert_eq!(ring.ready_count(), 1);
        assert_eq!(ring.sets_per_pool(), 22);
    }

    #[test]
    fn test_sets_per_pool_never_exceeds_cap() {
        let mut pools = FakePools::default();
        let initial = pools.create(1000);
        let mut ring = PoolRing::new(initial, 1000, &ratios());

        for _ in 0..20_000 {
            allocate(&mut ring, &mut pools).unwrap();
            assert!(ring.sets_per_pool() <= MAX_SETS_PER_POOL);
        }
        assert!(pools.capacity.iter().all(|&c| c <= MAX_SETS_PER_POOL));
        assert_eq!(ring.sets_per_pool(), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_second_failure_is_fatal() {
        let mut ring = PoolRing::new(0usize, 4, &ratios());
        let result: RhiResult<()> = ring.allocate(
            |_, _| Ok(1usize),
            |_| Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
        );
        assert!(matches!(
            result,
            Err(RhiError::DescriptorPoolExhausted(
                vk::Result::ERROR_OUT_OF_POOL_MEMORY
            ))
        ));
        // The first pool is retired, the grown one stays available.
        assert_eq!(ring.full_count(), 1);
        assert_eq!(ring.ready_count(), 1);
    }

    #[test]
    fn test_fragmented_pool_also_retires() {
        let mut ring = PoolRing::new(0usize, 4, &ratios());
        let mut attempts = 0;
        let value = ring
            .allocate(
                |_, _| Ok(7usize),
                |p| {
                    attempts += 1;
                    if p == 0 {
                        Err(vk::Result::ERROR_FRAGMENTED_POOL)
                    } else {
                        Ok(p)
                    }
                },
            )
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_other_errors_do_not_retire_pool() {
        let mut ring = PoolRing::new(0usize, 4, &ratios());
        let mut created = 0;
        let result: RhiResult<()> = ring.allocate(
            |_, _| {
                created += 1;
                Ok(1usize)
            },
            |_| Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
        );
        assert!(matches!(result, Err(RhiError::VulkanError(_))));
        assert_eq!(created, 0);
        assert_eq!(ring.ready_count(), 1);
        assert_eq!(ring.full_count(), 0);
    }

    #[test]
    fn test_clear_moves_full_back_to_ready() {
        let mut pools = FakePools::default();
        let initial = pools.create(2);
        let mut ring = PoolRing::new(initial, 2, &ratios());
        for _ in 0..6 {
            allocate(&mut ring, &mut pools).unwrap();
        }
        assert!(ring.full_count() > 0);
        let total = ring.ready_count() + ring.full_count();

        let mut reset = Vec::new();
        ring.clear(|p| {
            reset.push(p);
            pools.used[p] = 0;
            Ok(())
        })
        .unwrap();

        assert_eq!(ring.full_count(), 0);
        assert_eq!(ring.ready_count(), total);
        reset.sort_unstable();
        assert_eq!(reset, (0..total).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_yields_every_pool() {
        let mut pools = FakePools::default();
        let initial = pools.create(1);
        let mut ring = PoolRing::new(initial, 1, &ratios());
        for _ in 0..3 {
            allocate(&mut ring, &mut pools).unwrap();
        }
        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained.len(), pools.capacity.len());
        assert_eq!(ring.ready_count() + ring.full_count(), 0);
    }

    #[test]
    fn test_layout_builder_ors_stages() {
        let builder = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        let bindings =
            builder.bindings_with_stages(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

        assert_eq!(bindings.len(), 2);
        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
            assert_eq!(binding.descriptor_count, 1);
            assert_eq!(
                binding.stage_flags,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
            );
        }
    }

    #[test]
    fn test_layout_builder_clear() {
        let mut builder =
            DescriptorLayoutBuilder::new().add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        builder.clear();
        assert!(builder
            .bindings_with_stages(vk::ShaderStageFlags::COMPUTE)
            .is_empty());
    }

    #[test]
    fn test_writer_records_and_clears() {
        let mut writer = DescriptorWriter::new();
        writer
            .write_buffer(
                0,
                vk::Buffer::null(),
                64,
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                vk::ImageView::null(),
                vk::Sampler::null(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.image_infos.len(), 1);
        assert_eq!(writer.buffer_infos.len(), 1);

        writer.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn test_allocator_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DescriptorAllocatorGrowable>();
        assert_send::<DescriptorSetLayout>();
    }
}
