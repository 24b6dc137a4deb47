use super::ast::{Instruction, Operand};
use super::word::{Are, OpcodeWord, OperandWord, RegisterWord, Word};

/// A machine word, or a placeholder for a label address that is filled in
/// by the second pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Ready(Word),
    Pending,
}

impl Slot {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    /// Unresolved words degrade to zero.
    pub fn word(&self) -> Word {
        match self {
            Slot::Ready(word) => *word,
            Slot::Pending => Word::ZERO,
        }
    }
}

/// Encoding of one instruction statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLine {
    /// Index into the program's statement list.
    pub statement: usize,
    pub address: u16,
    pub slots: Vec<Slot>,
}

impl EncodedLine {
    pub fn words(&self) -> impl Iterator<Item = Word> + '_ {
        self.slots.iter().map(Slot::word)
    }

    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_pending())
            .map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Source,
    Dest,
}

pub fn encode_instruction(instruction: &Instruction) -> Vec<Slot> {
    let mode = |op: &Option<Operand>| op.as_ref().map_or(0, |op| op.mode().code());

    let mut slots = vec![Slot::Ready(
        OpcodeWord::new()
            .with_are(Are::Absolute as u8)
            .with_opcode(instruction.opcode.code())
            .with_source(mode(&instruction.source))
            .with_dest(mode(&instruction.dest))
            .into(),
    )];

    match (&instruction.source, &instruction.dest) {
        (Some(Operand::Register(source)), Some(Operand::Register(dest))) => {
            slots.push(Slot::Ready(
                RegisterWord::new()
                    .with_source(*source)
                    .with_dest(*dest)
                    .into(),
            ));
        }
        (source, dest) => {
            if let Some(op) = source {
                encode_operand(op, Position::Source, &mut slots);
            }
            if let Some(op) = dest {
                encode_operand(op, Position::Dest, &mut slots);
            }
        }
    }

    slots
}

fn encode_operand(operand: &Operand, position: Position, slots: &mut Vec<Slot>) {
    match operand {
        Operand::Immediate(value) => {
            slots.push(Slot::Ready(
                OperandWord::new()
                    .with_are(Are::Absolute as u8)
                    .with_value(*value as u8)
                    .into(),
            ));
        }
        Operand::Direct(_) => slots.push(Slot::Pending),
        Operand::Register(reg) => {
            let word = match position {
                Position::Source => RegisterWord::new().with_source(*reg),
                Position::Dest => RegisterWord::new().with_dest(*reg),
            };
            slots.push(Slot::Ready(word.into()));
        }
        Operand::Matrix { row, col, .. } => {
            slots.push(Slot::Pending);
            slots.push(Slot::Ready(
                RegisterWord::new().with_source(*row).with_dest(*col).into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ast::Opcode;

    fn inst(opcode: Opcode, source: Option<Operand>, dest: Option<Operand>) -> Instruction {
        Instruction {
            opcode,
            source,
            dest,
        }
    }

    fn raw(slots: &[Slot]) -> Vec<Option<u16>> {
        slots
            .iter()
            .map(|slot| match slot {
                Slot::Ready(word) => Some(word.raw()),
                Slot::Pending => None,
            })
            .collect()
    }

    #[test]
    fn immediate_to_register() {
        let slots = encode_instruction(&inst(
            Opcode::Mov,
            Some(Operand::Immediate(5)),
            Some(Operand::Register(2)),
        ));
        // mov = 0, source immediate = 0, dest register = 2
        assert_eq!(raw(&slots), vec![Some(0b0000_00_10_00), Some(5 << 2), Some(2 << 2)]);
    }

    #[test]
    fn registers_share_a_word() {
        let slots = encode_instruction(&inst(
            Opcode::Add,
            Some(Operand::Register(3)),
            Some(Operand::Register(5)),
        ));
        assert_eq!(
            raw(&slots),
            vec![Some(0b0010_10_10_00), Some((3 << 6) | (5 << 2))]
        );
    }

    #[test]
    fn labels_are_pending() {
        let slots = encode_instruction(&inst(
            Opcode::Lea,
            Some(Operand::Matrix {
                label: "M".to_owned(),
                row: 1,
                col: 4,
            }),
            Some(Operand::Direct("X".to_owned())),
        ));
        assert_eq!(
            raw(&slots),
            vec![
                Some(0b0100_11_01_00),
                None,
                Some((1 << 6) | (4 << 2)),
                None
            ]
        );

        let line = EncodedLine {
            statement: 0,
            address: 100,
            slots,
        };
        assert_eq!(line.pending().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(line.words().nth(1), Some(Word::ZERO));
        assert_eq!(line.len(), 4);
    }

    #[test]
    fn negative_immediate_is_twos_complement() {
        let slots = encode_instruction(&inst(
            Opcode::Cmp,
            Some(Operand::Immediate(-1)),
            Some(Operand::Register(0)),
        ));
        assert_eq!(slots[1], Slot::Ready(Word::new(0xFF << 2)));
    }

    #[test]
    fn single_operand_uses_destination() {
        let slots = encode_instruction(&inst(Opcode::Inc, None, Some(Operand::Register(6))));
        assert_eq!(raw(&slots), vec![Some((7 << 6) | (2 << 2)), Some(6 << 2)]);

        let slots = encode_instruction(&inst(Opcode::Stop, None, None));
        assert_eq!(raw(&slots), vec![Some(15 << 6)]);
    }
}
