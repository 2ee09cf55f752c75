//! Byte buffer with label and forward-reference patching.
//!
//! Used by the AArch64 backend; the x86-64 backend delegates label handling
//! to its external encoder.

use crate::error::EmitError;

/// An opaque label handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(pub(crate) usize);

/// Relocation kind for a pending branch.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Fixup {
    /// AArch64 `B`/`BL`: 26-bit word offset in bits 25:0.
    Branch26,
    /// AArch64 `CBZ`/`CBNZ`/`B.cond`: 19-bit word offset in bits 23:5.
    Branch19,
}

/// Code bytes under construction.
pub struct CodeBuffer {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label, Fixup)>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self { code: Vec::with_capacity(256), labels: Vec::new(), fixups: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn emit_u32(&mut self, word: u32) {
        self.code.extend_from_slice(&word.to_le_bytes());
    }

    /// Allocate an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> Result<(), EmitError> {
        let slot = &mut self.labels[label.0];
        if slot.is_some() {
            return Err(EmitError::LabelRebound(label.0));
        }
        *slot = Some(self.code.len());
        Ok(())
    }

    /// Record a branch word that needs its offset patched once `label` is
    /// bound. The placeholder word must already carry its opcode bits.
    pub(crate) fn emit_fixup(&mut self, word: u32, label: Label, kind: Fixup) {
        self.fixups.push((self.code.len(), label, kind));
        self.emit_u32(word);
    }

    /// Patch all pending branches and return the finished bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, EmitError> {
        for (offset, label, kind) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0].ok_or(EmitError::LabelUnbound(label.0))?;
            let delta = (target as i64 - offset as i64) / 4;
            let mut word = u32::from_le_bytes(
                self.code[offset..offset + 4].try_into().expect("fixup in range"),
            );
            match kind {
                Fixup::Branch26 => {
                    if !(-(1 << 25)..1 << 25).contains(&delta) {
                        return Err(EmitError::BranchRange(label.0));
                    }
                    word = word & 0xFC00_0000 | (delta as u32 & 0x03FF_FFFF);
                }
                Fixup::Branch19 => {
                    if !(-(1 << 18)..1 << 18).contains(&delta) {
                        return Err(EmitError::BranchRange(label.0));
                    }
                    word = word & 0xFF00_001F | ((delta as u32 & 0x7_FFFF) << 5);
                }
            }
            self.code[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
        }
        Ok(self.code)
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_patched() {
        let mut buf = CodeBuffer::new();
        let l = buf.new_label();
        buf.emit_fixup(0x1400_0000, l, Fixup::Branch26); // b <l>
        buf.emit_u32(0xD503_201F); // nop
        buf.bind(l).unwrap();
        let code = buf.finish().unwrap();
        let branch = u32::from_le_bytes(code[0..4].try_into().unwrap());
        assert_eq!(branch, 0x1400_0002);
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut buf = CodeBuffer::new();
        let l = buf.new_label();
        buf.emit_fixup(0x1400_0000, l, Fixup::Branch26);
        assert!(matches!(buf.finish(), Err(EmitError::LabelUnbound(_))));
    }
}
