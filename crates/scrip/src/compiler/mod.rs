//! Last stage: lays the xlations out and packs them into bytes.
//!
//! Layout runs first so label references can be written as byte offsets.
//! Field widths never depend on label values, so measuring an xlation with
//! its labels unresolved gives its final size.

mod packer;

use scrip_util::Idx;
use tracing::{debug, trace};

use crate::diagnostics::ErrorKind;
use crate::model::{
    constant::Constant,
    translation::{AttributeValue, DataAttribute, DataSource, DataType, Field, Xlation},
};
use crate::pipeline::{BuildContext, StageStatus};
use crate::scanner::parse_number;
use crate::session::Session;
use crate::source::Range;

pub use packer::BitPacker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerState {
    Init,
    Layout,
    Emitting,
    Finished,
}

pub struct Compiler {
    state: CompilerState,
    position: usize,
    // byte offset of every xlation, plus the end of the stream
    offsets: Vec<u32>,
    // byte offset of every label, by label index
    labels: Vec<Option<u32>>,
    packer: BitPacker,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            state: CompilerState::Init,
            position: 0,
            offsets: Vec::new(),
            labels: Vec::new(),
            packer: BitPacker::new(),
        }
    }

    pub fn state(&self) -> CompilerState {
        self.state
    }

    pub fn step(&mut self, ctx: &mut BuildContext) -> StageStatus {
        match self.state {
            CompilerState::Init => {
                debug!(xlations = ctx.xlations.len(), "compiling");
                self.offsets = vec![0];
                self.state = CompilerState::Layout;
            }
            CompilerState::Layout => self.layout(ctx),
            CompilerState::Emitting => self.emit(ctx),
            CompilerState::Finished => {}
        }
        if self.state == CompilerState::Finished {
            StageStatus::Finished
        } else {
            StageStatus::Running
        }
    }

    fn layout(&mut self, ctx: &mut BuildContext) {
        let Some(xlation) = ctx.xlations.get(self.position) else {
            self.labels = ctx
                .symbols
                .labels()
                .map(|(_, label)| label.xlation.and_then(|position| self.offsets.get(position).copied()))
                .collect();
            debug!(bytes = self.offsets.last().copied().unwrap_or(0), "layout done");
            self.position = 0;
            self.state = CompilerState::Emitting;
            return;
        };

        let mut scratch = BitPacker::new();
        Encoder::new(&ctx.session, &[]).xlation(&mut scratch, xlation);
        let end = self.offsets.last().copied().unwrap_or(0) + scratch.len() as u32;
        self.offsets.push(end);
        self.position += 1;
        ctx.progress(self.position, ctx.xlations.len() * 2);
    }

    fn emit(&mut self, ctx: &mut BuildContext) {
        let Some(xlation) = ctx.xlations.get(self.position) else {
            ctx.output = std::mem::take(&mut self.packer).finish();
            debug!(bytes = ctx.output.len(), "compiling finished");
            self.state = CompilerState::Finished;
            return;
        };

        let mut encoder = Encoder::new(&ctx.session, &self.labels);
        encoder.xlation(&mut self.packer, xlation);
        trace!(
            offset = self.offsets.get(self.position).copied().unwrap_or(0),
            translation = ctx.session.translation(xlation.translation).name(),
            "emitted"
        );
        let errors = encoder.errors;
        for (kind, range) in errors {
            ctx.report(kind, range);
        }
        self.position += 1;
        let total = ctx.xlations.len();
        ctx.progress(total + self.position, total * 2);
    }
}

/// Writes xlations field by field. Problems are collected, not reported, so
/// the layout pass can run the same code silently.
struct Encoder<'a> {
    session: &'a Session,
    labels: &'a [Option<u32>],
    errors: Vec<(ErrorKind, Range)>,
}

impl<'a> Encoder<'a> {
    fn new(session: &'a Session, labels: &'a [Option<u32>]) -> Self {
        Self {
            session,
            labels,
            errors: Vec::new(),
        }
    }

    fn xlation(&mut self, packer: &mut BitPacker, xlation: &Xlation) {
        let translation = self.session.translation(xlation.translation);
        for block in translation.data() {
            for field in &block.fields {
                self.field(packer, xlation, field);
            }
            packer.align();
        }
    }

    fn field(&mut self, packer: &mut BitPacker, xlation: &Xlation, field: &Field) {
        match field.data_type {
            DataType::Args => {
                packer.align();
                for arg in &xlation.args {
                    self.xlation(packer, arg);
                }
            }
            DataType::Int | DataType::Float | DataType::Fixed => {
                let width = field.size.unwrap_or(xlation.value_size);
                let value = self.number(xlation, field);
                let bits = match field.data_type {
                    DataType::Int => value.to_int(),
                    // float fields are 32 bits wide
                    DataType::Float => i64::from(value.to_float().to_bits()),
                    _ => fixed(value, width),
                };
                if !fits(bits, width) {
                    self.errors.push((ErrorKind::ValueTruncated(bits, width), xlation.range));
                }
                packer.push(bits as u64, width);
            }
            DataType::Char | DataType::String => {
                let text = self.text(xlation, field);
                let bytes = text.as_bytes();
                let width = match (field.data_type, field.size) {
                    (_, Some(size)) => Some(size),
                    (DataType::Char, None) => Some(8),
                    _ => None,
                };
                match width {
                    Some(width) => {
                        let capacity = (width / 8) as usize;
                        if bytes.len() > capacity {
                            self.errors.push((ErrorKind::TextTruncated(text.clone(), width), xlation.range));
                        }
                        let kept = &bytes[..bytes.len().min(capacity)];
                        packer.push_bytes(kept);
                        packer.push(0, width - kept.len() as u32 * 8);
                    }
                    None => packer.push_bytes(bytes),
                }
            }
        }
    }

    // raw value of a field before conversion; `None` after reporting
    fn value(&mut self, xlation: &Xlation, field: &Field) -> Option<AttributeValue> {
        match field.source {
            DataSource::Literal => field.value.clone().map(AttributeValue::Text),
            DataSource::Env => {
                let name = field.value.clone().unwrap_or_default();
                match self.session.env(&name) {
                    Some(value) => Some(AttributeValue::Text(value.to_string())),
                    None => {
                        self.errors.push((ErrorKind::MissingEnv(name), xlation.range));
                        None
                    }
                }
            }
            source => match (xlation.get(source, field.attribute), field.attribute) {
                (Some(AttributeValue::Label(label)), _) => {
                    let offset = self.labels.get(label.index()).copied().flatten().unwrap_or(0);
                    Some(AttributeValue::Int(offset.into()))
                }
                (Some(value), _) => Some(value.clone()),
                (None, DataAttribute::Count) => Some(AttributeValue::Int(xlation.args.len() as i64)),
                (None, attribute) => {
                    let translation = self.session.translation(xlation.translation).name().to_string();
                    let what = format!("{source:?}.{attribute:?}").to_lowercase();
                    self.errors
                        .push((ErrorKind::MissingAttribute(translation, what), xlation.range));
                    None
                }
            },
        }
    }

    fn number(&mut self, xlation: &Xlation, field: &Field) -> Constant {
        match self.value(xlation, field) {
            Some(AttributeValue::Int(value)) => Constant::Int(value),
            Some(AttributeValue::Float(value)) => Constant::Float(value),
            Some(AttributeValue::Text(text)) => parse_number(&text).unwrap_or_else(|| {
                self.errors.push((ErrorKind::BadLiteral(text), xlation.range));
                Constant::Int(0)
            }),
            // labels are resolved by `value`
            Some(AttributeValue::Label(_)) | None => Constant::Int(0),
        }
    }

    fn text(&mut self, xlation: &Xlation, field: &Field) -> String {
        match self.value(xlation, field) {
            Some(AttributeValue::Text(text)) => text,
            Some(AttributeValue::Int(value)) => value.to_string(),
            Some(AttributeValue::Float(value)) => value.to_string(),
            Some(AttributeValue::Label(_)) | None => String::new(),
        }
    }
}

/// Fixed point with `width / 4` fraction bits.
pub fn fixed(value: Constant, width: u32) -> i64 {
    let scale = (1u64 << (width / 4).min(62)) as f64;
    (f64::from(value.to_float()) * scale).round() as i64
}

// representable in `width` bits as either a signed or an unsigned number
fn fits(value: i64, width: u32) -> bool {
    if width >= 64 {
        return true;
    }
    if width == 0 {
        return value == 0;
    }
    let min = -(1i64 << (width - 1));
    let max = (1i64 << width) - 1;
    (min..=max).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build, parse};

    fn compile(source: &str) -> (Vec<u8>, Vec<ErrorKind>) {
        let mut build = build(source);
        build.run();
        let errors = build.diagnostics().iter().map(|d| d.kind.clone()).collect();
        (build.output().to_vec(), errors)
    }

    #[test]
    fn test_wait_zero() {
        let (output, errors) = compile("WAIT 0");
        assert!(errors.is_empty());
        assert_eq!(output, vec![0x01, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn test_label_offsets() {
        let (output, errors) = compile("GOTO done\nWAIT 0\ndone:\nWAIT 1");
        assert!(errors.is_empty());
        assert_eq!(
            output,
            vec![
                0x02, 0x00, 0x01, 0x0B, 0x00, 0x00, 0x00, // GOTO done
                0x01, 0x00, 0x04, 0x00, // WAIT 0
                0x01, 0x00, 0x04, 0x01, // WAIT 1
            ]
        );
    }

    #[test]
    fn test_text_arguments() {
        let (output, errors) = compile("PRINT \"hi\" 5");
        assert!(errors.is_empty());
        assert_eq!(
            output,
            vec![0x03, 0x00, 0x09, b'h', b'i', 0, 0, 0, 0, 0, 0, 0x04, 0x05]
        );

        // too long for the bounded value, written with its length instead
        let (output, errors) = compile("PRINT \"hello world\" 5");
        assert!(errors.is_empty());
        let mut expected = vec![0x03, 0x00, 0x0E, 11];
        expected.extend_from_slice(b"hello world");
        expected.extend_from_slice(&[0x04, 0x05]);
        assert_eq!(output, expected);
    }

    #[test]
    fn test_variables_and_floats() {
        let (output, errors) = compile("VAR_FLOAT f\nf = 1.5");
        assert!(errors.is_empty());
        let mut expected = vec![0x06, 0x00, 0x02, 0x00, 0x00, 0x06];
        expected.extend_from_slice(&1.5f32.to_bits().to_le_bytes());
        assert_eq!(output, expected);
    }

    #[test]
    fn test_array_element_carries_its_index() {
        let (output, errors) = compile("VAR_INT arr[3]\nWAIT arr[2]");
        assert!(errors.is_empty());
        assert_eq!(
            output,
            vec![0x01, 0x00, 0x07, 0x00, 0x00, 0x03, 0x04, 0x02]
        );
    }

    #[test]
    fn test_value_truncated() {
        let (output, errors) = compile("#register_var 70000 VAR_INT big\nbig = 1");
        assert_eq!(errors, vec![ErrorKind::ValueTruncated(70000, 16)]);
        // the build still produces every byte
        assert_eq!(output.len(), 7);
    }

    #[test]
    fn test_fixed_width_translations_match_declared_width() {
        let ctx = parse("VAR_INT x\nx = 2\nGOTO end\nend:\nPRINT \"text\" 1");
        assert!(ctx.diagnostics.is_empty());
        let mut checked = 0;
        let mut pending: Vec<&Xlation> = ctx.xlations.iter().collect();
        while let Some(xlation) = pending.pop() {
            pending.extend(xlation.args.iter());
            let translation = ctx.session.translation(xlation.translation);
            if let scrip_util::Width::Fixed(bits) = translation.width() {
                let mut packer = BitPacker::new();
                Encoder::new(&ctx.session, &[]).xlation(&mut packer, xlation);
                assert_eq!(packer.len() * 8, bits as usize, "{}", translation.name());
                checked += 1;
            }
        }
        assert!(checked >= 3);
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(fixed(Constant::Float(1.5), 16), 24);
        assert_eq!(fixed(Constant::Int(-2), 8), -8);
        assert!(fits(-128, 8));
        assert!(fits(255, 8));
        assert!(!fits(256, 8));
        assert!(!fits(-129, 8));
    }
}
