//! Batched descriptor set writes and copies
//!
//! Requests name their target sets; names are resolved only when the batch is
//! applied, so the registry may still change between queueing and applying.

use ash::vk;

use super::descriptor_registry::DescriptorSetLookup;
use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::Device;

/// Write buffer descriptors into a binding
#[derive(Debug, Clone)]
pub struct BufferWriteRequest {
    /// Target set name
    pub set_name: String,
    /// Target binding
    pub binding: u32,
    /// `UNIFORM_BUFFER`, `STORAGE_BUFFER` or a dynamic variant
    pub descriptor_type: vk::DescriptorType,
    /// One entry per array element written
    pub buffers: Vec<vk::DescriptorBufferInfo>,
    /// First array element written
    pub array_element: u32,
}

/// Write image descriptors into a binding
#[derive(Debug, Clone)]
pub struct ImageWriteRequest {
    /// Target set name
    pub set_name: String,
    /// Target binding
    pub binding: u32,
    /// `COMBINED_IMAGE_SAMPLER`, `SAMPLED_IMAGE`, `STORAGE_IMAGE`, ...
    pub descriptor_type: vk::DescriptorType,
    /// One entry per array element written
    pub images: Vec<vk::DescriptorImageInfo>,
    /// First array element written
    pub array_element: u32,
}

/// Write texel buffer views into a binding
#[derive(Debug, Clone)]
pub struct TexelBufferWriteRequest {
    /// Target set name
    pub set_name: String,
    /// Target binding
    pub binding: u32,
    /// `UNIFORM_TEXEL_BUFFER` or `STORAGE_TEXEL_BUFFER`
    pub descriptor_type: vk::DescriptorType,
    /// One view per array element written
    pub buffer_views: Vec<vk::BufferView>,
    /// First array element written
    pub array_element: u32,
}

/// Copy descriptors from one set to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopySetRequest {
    /// Source set name
    pub source_set: String,
    /// Source binding
    pub source_binding: u32,
    /// First source array element
    pub source_array_element: u32,
    /// Destination set name
    pub dest_set: String,
    /// Destination binding
    pub dest_binding: u32,
    /// First destination array element
    pub dest_array_element: u32,
    /// Number of descriptors copied
    pub count: u32,
}

/// Everything to apply in one batch
#[derive(Debug, Clone, Default)]
pub struct DescriptorUpdateInfo {
    /// Buffer writes
    pub buffer_writes: Vec<BufferWriteRequest>,
    /// Image writes
    pub image_writes: Vec<ImageWriteRequest>,
    /// Texel buffer writes
    pub texel_buffer_writes: Vec<TexelBufferWriteRequest>,
    /// Set-to-set copies
    pub copies: Vec<CopySetRequest>,
}

/// Receiver of a resolved batch
pub trait DescriptorUpdateSink {
    /// Apply `writes` and `copies` in one call
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet], copies: &[vk::CopyDescriptorSet]);
}

impl DescriptorUpdateSink for Device {
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet], copies: &[vk::CopyDescriptorSet]) {
        Device::update_descriptor_sets(self, writes, copies);
    }
}

/// Queues descriptor updates and applies them as one native call
#[derive(Debug, Default)]
pub struct DescriptorUpdater {
    buffer_requests: Vec<BufferWriteRequest>,
    image_requests: Vec<ImageWriteRequest>,
    texel_requests: Vec<TexelBufferWriteRequest>,
    copy_requests: Vec<CopySetRequest>,
}

impl DescriptorUpdater {
    /// Updater with empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a buffer write
    pub fn add_buffer_update(&mut self, request: BufferWriteRequest) {
        self.buffer_requests.push(request);
    }

    /// Queue an image write
    pub fn add_image_update(&mut self, request: ImageWriteRequest) {
        self.image_requests.push(request);
    }

    /// Queue a texel buffer write
    pub fn add_texel_buffer_update(&mut self, request: TexelBufferWriteRequest) {
        self.texel_requests.push(request);
    }

    /// Queue a copy
    pub fn add_copy_request(&mut self, request: CopySetRequest) {
        self.copy_requests.push(request);
    }

    /// Queue every request in `info`
    pub fn add_update_info(&mut self, info: &DescriptorUpdateInfo) {
        self.buffer_requests.extend(info.buffer_writes.iter().cloned());
        self.image_requests.extend(info.image_writes.iter().cloned());
        self.texel_requests.extend(info.texel_buffer_writes.iter().cloned());
        self.copy_requests.extend(info.copies.iter().cloned());
    }

    /// Number of queued requests across all queues
    pub fn pending(&self) -> usize {
        self.buffer_requests.len() + self.image_requests.len() + self.texel_requests.len() + self.copy_requests.len()
    }

    /// Whether every queue is empty
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Resolve set names through `lookup` and hand everything to `sink` at once
    ///
    /// The queues are drained up front, so they are empty afterwards whether
    /// or not the batch succeeds. Resolution happens before anything is
    /// issued: if a name is unknown or a write is empty, the error is
    /// returned and `sink` is not called. Returns the number of entries applied.
    pub fn apply_updates(
        &mut self,
        lookup: &dyn DescriptorSetLookup,
        sink: &dyn DescriptorUpdateSink,
    ) -> VulkanResult<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let buffer_requests = std::mem::take(&mut self.buffer_requests);
        let image_requests = std::mem::take(&mut self.image_requests);
        let texel_requests = std::mem::take(&mut self.texel_requests);
        let copy_requests = std::mem::take(&mut self.copy_requests);

        let mut writes = Vec::with_capacity(buffer_requests.len() + image_requests.len() + texel_requests.len());
        for request in &buffer_requests {
            ensure_not_empty(&request.set_name, request.binding, request.buffers.len())?;
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(lookup.descriptor_set_handle(&request.set_name)?)
                    .dst_binding(request.binding)
                    .dst_array_element(request.array_element)
                    .descriptor_type(request.descriptor_type)
                    .buffer_info(&request.buffers)
                    .build(),
            );
        }
        for request in &image_requests {
            ensure_not_empty(&request.set_name, request.binding, request.images.len())?;
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(lookup.descriptor_set_handle(&request.set_name)?)
                    .dst_binding(request.binding)
                    .dst_array_element(request.array_element)
                    .descriptor_type(request.descriptor_type)
                    .image_info(&request.images)
                    .build(),
            );
        }
        for request in &texel_requests {
            ensure_not_empty(&request.set_name, request.binding, request.buffer_views.len())?;
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(lookup.descriptor_set_handle(&request.set_name)?)
                    .dst_binding(request.binding)
                    .dst_array_element(request.array_element)
                    .descriptor_type(request.descriptor_type)
                    .texel_buffer_view(&request.buffer_views)
                    .build(),
            );
        }

        let mut copies = Vec::with_capacity(copy_requests.len());
        for request in &copy_requests {
            copies.push(
                vk::CopyDescriptorSet::builder()
                    .src_set(lookup.descriptor_set_handle(&request.source_set)?)
                    .src_binding(request.source_binding)
                    .src_array_element(request.source_array_element)
                    .dst_set(lookup.descriptor_set_handle(&request.dest_set)?)
                    .dst_binding(request.dest_binding)
                    .dst_array_element(request.dest_array_element)
                    .descriptor_count(request.count)
                    .build(),
            );
        }

        sink.update_descriptor_sets(&writes, &copies);
        let applied = writes.len() + copies.len();
        log::trace!("Applied {} descriptor writes and {} copies", writes.len(), copies.len());
        Ok(applied)
    }
}

fn ensure_not_empty(set_name: &str, binding: u32, count: usize) -> VulkanResult<()> {
    if count == 0 {
        return Err(VulkanError::InvalidOperation {
            reason: format!("descriptor write to '{set_name}' binding {binding} has no descriptors"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeSets(HashMap<String, vk::DescriptorSet>);

    impl FakeSets {
        fn new(names: &[&str]) -> Self {
            Self(
                names
                    .iter()
                    .zip(1u64..)
                    .map(|(name, raw)| ((*name).to_string(), vk::DescriptorSet::from_raw(raw)))
                    .collect(),
            )
        }
    }

    impl DescriptorSetLookup for FakeSets {
        fn descriptor_set_handle(&self, name: &str) -> VulkanResult<vk::DescriptorSet> {
            self.0
                .get(name)
                .copied()
                .ok_or_else(|| VulkanError::not_found("descriptor set", name))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct RecordedWrite {
        set: vk::DescriptorSet,
        binding: u32,
        count: u32,
        descriptor_type: vk::DescriptorType,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<(Vec<RecordedWrite>, usize)>>,
    }

    impl DescriptorUpdateSink for RecordingSink {
        fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet], copies: &[vk::CopyDescriptorSet]) {
            let writes = writes
                .iter()
                .map(|w| RecordedWrite {
                    set: w.dst_set,
                    binding: w.dst_binding,
                    count: w.descriptor_count,
                    descriptor_type: w.descriptor_type,
                })
                .collect();
            self.calls.borrow_mut().push((writes, copies.len()));
        }
    }

    fn buffer_write(set: &str, binding: u32) -> BufferWriteRequest {
        BufferWriteRequest {
            set_name: set.into(),
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            buffers: vec![vk::DescriptorBufferInfo {
                buffer: vk::Buffer::null(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            }],
            array_element: 0,
        }
    }

    fn image_write(set: &str) -> ImageWriteRequest {
        ImageWriteRequest {
            set_name: set.into(),
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            images: vec![vk::DescriptorImageInfo::default(); 2],
            array_element: 0,
        }
    }

    #[test]
    fn test_one_batched_call_with_every_entry() {
        let sets = FakeSets::new(&["global", "material"]);
        let sink = RecordingSink::default();
        let mut updater = DescriptorUpdater::new();
        updater.add_buffer_update(buffer_write("global", 0));
        updater.add_image_update(image_write("material"));
        updater.add_texel_buffer_update(TexelBufferWriteRequest {
            set_name: "material".into(),
            binding: 2,
            descriptor_type: vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            buffer_views: vec![vk::BufferView::null()],
            array_element: 0,
        });
        updater.add_copy_request(CopySetRequest {
            source_set: "global".into(),
            dest_set: "material".into(),
            count: 1,
            ..Default::default()
        });
        assert_eq!(updater.pending(), 4);

        assert_eq!(updater.apply_updates(&sets, &sink).unwrap(), 4);
        assert!(updater.is_empty());

        let calls = sink.calls.borrow();
        assert_eq!(calls.len(), 1);
        let (writes, copies) = &calls[0];
        assert_eq!(*copies, 1);
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].set, vk::DescriptorSet::from_raw(1));
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[1].set, vk::DescriptorSet::from_raw(2));
        assert_eq!(writes[1].count, 2);
        assert_eq!(writes[2].binding, 2);
    }

    #[test]
    fn test_names_resolve_at_apply_time() {
        let sink = RecordingSink::default();
        let mut updater = DescriptorUpdater::new();
        let mut sets = FakeSets::new(&["other"]);
        updater.add_buffer_update(buffer_write("late", 0));

        // Registered between queueing and applying
        sets.0.insert("late".into(), vk::DescriptorSet::from_raw(9));
        assert_eq!(updater.apply_updates(&sets, &sink).unwrap(), 1);
        assert_eq!(sink.calls.borrow()[0].0[0].set, vk::DescriptorSet::from_raw(9));
    }

    #[test]
    fn test_failed_batch_does_not_block_later_batches() {
        let sets = FakeSets::new(&["good"]);
        let sink = RecordingSink::default();
        let mut updater = DescriptorUpdater::new();

        updater.add_update_info(&DescriptorUpdateInfo {
            buffer_writes: vec![buffer_write("typo", 0), buffer_write("good", 1)],
            ..Default::default()
        });
        match updater.apply_updates(&sets, &sink) {
            Err(VulkanError::NotFound { name, .. }) => assert_eq!(name, "typo"),
            other => panic!("expected an unknown set, got {other:?}"),
        }
        assert!(sink.calls.borrow().is_empty());
        assert!(updater.is_empty());

        updater.add_update_info(&DescriptorUpdateInfo {
            buffer_writes: vec![buffer_write("good", 0)],
            ..Default::default()
        });
        assert_eq!(updater.apply_updates(&sets, &sink).unwrap(), 1);
        let calls = sink.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.len(), 1);
        assert_eq!(calls[0].0[0].binding, 0);
    }

    #[test]
    fn test_empty_queues_issue_nothing() {
        let sink = RecordingSink::default();
        let mut updater = DescriptorUpdater::new();
        assert_eq!(updater.apply_updates(&FakeSets::new(&[]), &sink).unwrap(), 0);
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_write_without_descriptors_is_rejected() {
        let sink = RecordingSink::default();
        let mut updater = DescriptorUpdater::new();
        let mut request = buffer_write("global", 0);
        request.buffers.clear();
        updater.add_buffer_update(request);
        assert!(matches!(
            updater.apply_updates(&FakeSets::new(&["global"]), &sink),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(sink.calls.borrow().is_empty());
        assert!(updater.is_empty());
    }

    #[test]
    fn test_update_info_queues_everything() {
        let mut updater = DescriptorUpdater::new();
        updater.add_update_info(&DescriptorUpdateInfo {
            buffer_writes: vec![buffer_write("a", 0), buffer_write("a", 1)],
            image_writes: vec![image_write("b")],
            ..Default::default()
        });
        assert_eq!(updater.pending(), 3);
    }
}
