use snapnet::EntityState;

pub const SVC_PRINT: u8 = 10;
pub const SVC_FRAME: u8 = 20;

pub const CLC_MOVE: u8 = 2;
pub const CLC_STRINGCMD: u8 = 4;

/// Frames kept for delta compression on each side.
pub const UPDATE_BACKUP: usize = 16;

#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u32,
    pub entities: Vec<EntityState>,
}

/// Ring of recent frames indexed by sequence.
#[derive(Debug)]
pub struct FrameHistory {
    slots: Vec<Option<Frame>>,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self {
            slots: vec![None; UPDATE_BACKUP],
        }
    }
}

impl FrameHistory {
    pub fn store(&mut self, frame: Frame) {
        let slot = frame.sequence as usize % UPDATE_BACKUP;
        self.slots[slot] = Some(frame);
    }

    pub fn get(&self, sequence: u32) -> Option<&Frame> {
        self.slots[sequence as usize % UPDATE_BACKUP]
            .as_ref()
            .filter(|frame| frame.sequence == sequence)
    }
}

pub fn baseline(number: u16) -> EntityState {
    EntityState::new(number)
}
