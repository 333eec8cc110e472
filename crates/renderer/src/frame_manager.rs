//! Frame-slot cycling and the acquire → submit → present protocol.
//!
//! [`FrameCycle`] is the bookkeeping of the loop, free of GPU calls: which
//! slot is current, whether its fence has been waited since its last
//! submission, and which step of the protocol comes next. [`FrameManager`]
//! drives the Vulkan objects of each slot through it.
//!
//! ```text
//! wait(in_flight[slot]) -> acquire(signals image_available[slot])
//!   -> record -> reset fence -> submit(waits image_available, signals
//!      render_finished + in_flight) -> present(waits render_finished)
//!   -> slot = (slot + 1) mod N
//! ```
//!
//! An out-of-date acquire ends the tick with [`FrameStatus::Skip`]: nothing is
//! submitted, the fence stays signaled, and the slot does not advance.
//!
//! A frame whose recording fails is aborted instead: an empty submission
//! consumes the acquire semaphore and signals the fence, the slot stays
//! current, and the next tick starts with a fence wait as usual.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::command::CommandPool;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::swapchain::Swapchain;
//! use renderer_renderer::frame_manager::{FrameManager, FrameStatus};
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool, swapchain: &Swapchain)
//! #     -> renderer_renderer::RenderResult<()> {
//! let mut frames = FrameManager::new(device, pool)?;
//! if let FrameStatus::Ready(frame) = frames.acquire_frame(swapchain)? {
//!     let cmd = frames.begin_recording()?;
//!     // ... record passes for frame.image_index ...
//!     frames.submit_frame()?;
//!     frames.present_frame(swapchain)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace};

use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::device::Device;
use renderer_rhi::swapchain::{AcquireResult, PresentResult, Swapchain};
use renderer_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

use crate::error::{RenderError, RenderResult};
use crate::render_data::FrameSlot;

/// A successfully acquired frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    pub slot: FrameSlot,
    pub image_index: u32,
    /// Usable, but the swapchain should be recreated after present
    pub suboptimal: bool,
}

/// Outcome of [`FrameManager::acquire_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ready(AcquiredFrame),
    /// Surface out of date: recreate the swapchain and produce no frame
    Skip,
}

/// Outcome of [`FrameManager::present_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The frame counted, but the swapchain must be recreated
    NeedsRecreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    FenceWaited,
    Acquired(AcquiredFrame),
    Submitted(AcquiredFrame),
}

/// GPU-free state of the frame loop.
#[derive(Debug, Clone)]
pub struct FrameCycle {
    slot: FrameSlot,
    phase: Phase,
    /// Slot has a submission whose fence was not waited since
    pending: [bool; MAX_FRAMES_IN_FLIGHT],
    presented: u64,
    skipped: u64,
}

impl FrameCycle {
    pub fn new() -> Self {
        Self {
            slot: FrameSlot::default(),
            phase: Phase::Idle,
            pending: [false; MAX_FRAMES_IN_FLIGHT],
            presented: 0,
            skipped: 0,
        }
    }

    #[inline]
    pub fn current_slot(&self) -> FrameSlot {
        self.slot
    }

    /// Whether `slot` has GPU work the host has not waited for.
    #[inline]
    pub fn is_pending(&self, slot: FrameSlot) -> bool {
        self.pending[slot.index()]
    }

    /// Frames that reached present.
    #[inline]
    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    /// Ticks that ended with [`FrameStatus::Skip`].
    #[inline]
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    fn out_of_order(&self, operation: &str) -> RenderError {
        RenderError::FrameOrder(format!(
            "{operation} on slot {} during {:?}",
            self.slot, self.phase
        ))
    }

    /// The current slot's fence has been waited on.
    pub fn fence_waited(&mut self) -> RenderResult<()> {
        match self.phase {
            Phase::Idle | Phase::FenceWaited => {
                self.pending[self.slot.index()] = false;
                self.phase = Phase::FenceWaited;
                Ok(())
            }
            _ => Err(self.out_of_order("fence wait")),
        }
    }

    /// Applies the result of image acquisition.
    ///
    /// # Errors
    ///
    /// [`RenderError::FrameOrder`] unless the slot's fence was waited first.
    pub fn acquired(&mut self, result: AcquireResult) -> RenderResult<FrameStatus> {
        if self.phase != Phase::FenceWaited || self.is_pending(self.slot) {
            return Err(self.out_of_order("acquire"));
        }

        match result {
            AcquireResult::OutOfDate => {
                self.phase = Phase::Idle;
                self.skipped += 1;
                Ok(FrameStatus::Skip)
            }
            AcquireResult::Acquired {
                image_index,
                suboptimal,
            } => {
                let frame = AcquiredFrame {
                    slot: self.slot,
                    image_index,
                    suboptimal,
                };
                self.phase = Phase::Acquired(frame);
                Ok(FrameStatus::Ready(frame))
            }
        }
    }

    /// The acquired frame, while it is being recorded or awaits present.
    pub fn current_frame(&self) -> Option<AcquiredFrame> {
        match self.phase {
            Phase::Acquired(frame) | Phase::Submitted(frame) => Some(frame),
            _ => None,
        }
    }

    /// The current slot's work was handed to the queue.
    pub fn submitted(&mut self) -> RenderResult<AcquiredFrame> {
        match self.phase {
            Phase::Acquired(frame) => {
                self.pending[self.slot.index()] = true;
                self.phase = Phase::Submitted(frame);
                Ok(frame)
            }
            _ => Err(self.out_of_order("submit")),
        }
    }

    /// The acquired frame was dropped before submission.
    ///
    /// The slot does not advance and stays pending: the acquire wait is still
    /// handed to the queue and signals the slot's fence.
    pub fn aborted(&mut self) -> RenderResult<AcquiredFrame> {
        let Phase::Acquired(frame) = self.phase else {
            return Err(self.out_of_order("abort"));
        };
        self.pending[self.slot.index()] = true;
        self.phase = Phase::Idle;
        self.skipped += 1;
        Ok(frame)
    }

    /// Applies the result of present and advances the slot.
    pub fn presented(&mut self, result: PresentResult) -> RenderResult<PresentStatus> {
        let Phase::Submitted(frame) = self.phase else {
            return Err(self.out_of_order("present"));
        };

        self.slot = self.slot.next();
        self.phase = Phase::Idle;
        self.presented += 1;

        match result {
            PresentResult::Presented if !frame.suboptimal => Ok(PresentStatus::Presented),
            _ => Ok(PresentStatus::NeedsRecreate),
        }
    }
}

impl Default for FrameCycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slot command buffers and synchronization, driven by a [`FrameCycle`].
pub struct FrameManager {
    device: Arc<Device>,
    syncs: Vec<FrameSync>,
    command_buffers: Vec<CommandBuffer>,
    cycle: FrameCycle,
}

impl FrameManager {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] slots with signaled fences.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive or command buffer creation fails.
    pub fn new(device: Arc<Device>, command_pool: &CommandPool) -> RenderResult<Self> {
        let mut syncs = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut command_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for handle in command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)? {
            syncs.push(FrameSync::new(device.clone())?);
            command_buffers.push(CommandBuffer::from_handle(device.clone(), handle));
        }

        info!("Frame manager created with {} frame slots", MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            device,
            syncs,
            command_buffers,
            cycle: FrameCycle::new(),
        })
    }

    #[inline]
    pub fn cycle(&self) -> &FrameCycle {
        &self.cycle
    }

    #[inline]
    pub fn current_slot(&self) -> FrameSlot {
        self.cycle.current_slot()
    }

    /// Command buffer of the current slot.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffers[self.current_slot().index()]
    }

    /// Waits for the current slot's fence, then acquires the next image.
    ///
    /// # Errors
    ///
    /// Fence failures and unexpected acquire results are fatal.
    pub fn acquire_frame(&mut self, swapchain: &Swapchain) -> RenderResult<FrameStatus> {
        let sync = &self.syncs[self.current_slot().index()];
        sync.in_flight().wait(u64::MAX)?;
        self.cycle.fence_waited()?;

        let result = swapchain.acquire_next_image(sync.image_available().handle())?;
        let status = self.cycle.acquired(result)?;

        match status {
            FrameStatus::Ready(frame) => trace!(
                "Acquired image {} on slot {}{}",
                frame.image_index,
                frame.slot,
                if frame.suboptimal { " (suboptimal)" } else { "" }
            ),
            FrameStatus::Skip => debug!("Swapchain out of date on acquire, skipping frame"),
        }
        Ok(status)
    }

    /// Resets and begins the current slot's command buffer.
    ///
    /// # Errors
    ///
    /// [`RenderError::FrameOrder`] unless a frame was acquired.
    pub fn begin_recording(&self) -> RenderResult<&CommandBuffer> {
        if self.cycle.current_frame().is_none() {
            return Err(RenderError::FrameOrder("recording without an acquired frame".into()));
        }
        let cmd = self.command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        Ok(cmd)
    }

    /// Ends recording and submits the slot to the graphics queue.
    ///
    /// The fence is reset here, after it is certain work will be submitted.
    ///
    /// # Errors
    ///
    /// Submission failures are fatal.
    pub fn submit_frame(&mut self) -> RenderResult<()> {
        let slot = self.current_slot().index();
        let (sync, cmd) = (&self.syncs[slot], &self.command_buffers[slot]);

        if self.cycle.current_frame().is_none() {
            return Err(RenderError::FrameOrder("submit without an acquired frame".into()));
        }
        cmd.end()?;
        sync.in_flight().reset()?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(sync.image_available().handle())
            .stage_mask(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags2::BLIT,
            )];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(sync.render_finished().handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle())];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait)
            .command_buffer_infos(&cmd_infos)
            .signal_semaphore_infos(&signal);

        // SAFETY: the buffer is fully recorded and the fence was just reset.
        unsafe {
            self.device
                .submit_graphics(&[submit], sync.in_flight().handle())
                .inspect_err(|e| tracing::error!("Queue submit failed: {}", e))?;
        }

        self.cycle.submitted()?;
        Ok(())
    }

    /// Drops the acquired frame without presenting it.
    ///
    /// The command buffer is reset and an empty submission waits on the
    /// acquire semaphore and signals the slot's fence. The image stays
    /// acquired until the swapchain is recreated.
    ///
    /// # Errors
    ///
    /// [`RenderError::FrameOrder`] unless a frame is acquired and not yet
    /// submitted; reset and submission failures are fatal.
    pub fn abort_frame(&mut self) -> RenderResult<()> {
        let frame = self.cycle.aborted()?;
        let (sync, cmd) = (&self.syncs[frame.slot.index()], &self.command_buffers[frame.slot.index()]);

        cmd.reset()?;
        sync.in_flight().reset()?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(sync.image_available().handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let submit = vk::SubmitInfo2::default().wait_semaphore_infos(&wait);

        // SAFETY: no command buffers; the fence was just reset.
        unsafe {
            self.device
                .submit_graphics(&[submit], sync.in_flight().handle())
                .inspect_err(|e| tracing::error!("Abort submit failed: {}", e))?;
        }

        debug!("Frame on slot {} aborted, image {} left unpresented", frame.slot, frame.image_index);
        Ok(())
    }

    /// Presents the submitted image and advances to the next slot.
    ///
    /// # Errors
    ///
    /// Unexpected present results are fatal.
    pub fn present_frame(&mut self, swapchain: &Swapchain) -> RenderResult<PresentStatus> {
        let frame = self
            .cycle
            .current_frame()
            .ok_or_else(|| RenderError::FrameOrder("present without a submitted frame".into()))?;
        let sync = &self.syncs[frame.slot.index()];

        let result = swapchain.present(
            self.device.present_queue(),
            frame.image_index,
            sync.render_finished().handle(),
        )?;
        let status = self.cycle.presented(result)?;

        if status == PresentStatus::NeedsRecreate {
            debug!("Swapchain needs recreation after present");
        }
        Ok(status)
    }

    /// Waits for every slot's fence.
    ///
    /// # Errors
    ///
    /// Fence failures are fatal.
    pub fn wait_all(&self) -> RenderResult<()> {
        for sync in &self.syncs {
            sync.in_flight().wait(u64::MAX)?;
        }
        Ok(())
    }
}
