//! Scheduler contract shared by every pipeline stage.
//!
//! A stage is handed whatever input is available and an output buffer with
//! some free space. It processes as much as it can and reports how many input
//! items it took and how many output items it wrote. Stages that need to look
//! ahead leave the unread tail unconsumed; stages that group items (the
//! trellis coder, the Viterbi decoder) buffer them internally.

/// Items consumed from the input and produced into the output by one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Work {
    pub consumed: usize,
    pub produced: usize,
}

impl Work {
    pub fn new(consumed: usize, produced: usize) -> Work {
        Work { consumed, produced }
    }

    pub fn is_idle(&self) -> bool {
        self.consumed == 0 && self.produced == 0
    }
}

/// Output items requested per call by [`Block::run`].
const RUN_CHUNK: usize = 24;

pub trait Block {
    type Input;
    type Output: Clone + Default;

    fn work(&mut self, input: &[Self::Input], output: &mut [Self::Output]) -> Work;

    /// Return to the freshly constructed state.
    fn reset(&mut self);

    /// Drive the block until it stalls. Returns the produced items and the
    /// number of input items taken.
    fn run_partial(&mut self, input: &[Self::Input]) -> (Vec<Self::Output>, usize) {
        let mut output = Vec::new();
        let mut buffer = vec![Self::Output::default(); RUN_CHUNK];
        let mut pos = 0;
        loop {
            let work = self.work(&input[pos..], &mut buffer);
            if work.is_idle() {
                break;
            }
            output.extend_from_slice(&buffer[..work.produced]);
            pos += work.consumed;
        }
        return (output, pos);
    }

    fn run(&mut self, input: &[Self::Input]) -> Vec<Self::Output> {
        return self.run_partial(input).0;
    }
}

/// Run `block` over `input`, leaving only the items it did not consume.
pub fn drain<B: Block>(block: &mut B, input: &mut Vec<B::Input>) -> Vec<B::Output> {
    let (output, consumed) = block.run_partial(input);
    input.drain(..consumed);
    return output;
}
