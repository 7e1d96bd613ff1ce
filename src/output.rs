use crate::error::{require_positive, Error, Result};
use crate::particle::{Particle, ParticleStore};
use serde::{Deserialize, Serialize};

/// Particle attribute that can be written to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputField {
    ParId,
    TStrt,
    SourceIdx,
    D,
    M,
    Wdecay,
    XPosInit,
    YPosInit,
    ZPosInit,
    XPos,
    YPos,
    ZPos,
    UMean,
    VMean,
    WMean,
    UFluct,
    VFluct,
    WFluct,
    DeltaUFluct,
    DeltaVFluct,
    DeltaWFluct,
    IsRogue,
    IsActive,
}

use self::OutputField::*;

/// Fields written regardless of the requested selection.
pub const IDENTIFIER_FIELDS: [OutputField; 4] = [ParId, TStrt, SourceIdx, IsActive];

pub const MINIMAL_FIELDS: [OutputField; 8] = [ParId, TStrt, SourceIdx, IsActive, IsRogue, XPos, YPos, ZPos];

pub const ALL_FIELDS: [OutputField; 23] = [
    ParId,
    TStrt,
    SourceIdx,
    D,
    M,
    Wdecay,
    XPosInit,
    YPosInit,
    ZPosInit,
    XPos,
    YPos,
    ZPos,
    UMean,
    VMean,
    WMean,
    UFluct,
    VFluct,
    WFluct,
    DeltaUFluct,
    DeltaVFluct,
    DeltaWFluct,
    IsRogue,
    IsActive,
];

/// One staged particle attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i32),
}

impl OutputField {
    pub fn from_name(name: &str) -> Option<OutputField> {
        ALL_FIELDS.iter().cloned().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            ParId => "parID",
            TStrt => "tStrt",
            SourceIdx => "sourceIdx",
            D => "d",
            M => "m",
            Wdecay => "wdecay",
            XPosInit => "xPos_init",
            YPosInit => "yPos_init",
            ZPosInit => "zPos_init",
            XPos => "xPos",
            YPos => "yPos",
            ZPos => "zPos",
            UMean => "uMean",
            VMean => "vMean",
            WMean => "wMean",
            UFluct => "uFluct",
            VFluct => "vFluct",
            WFluct => "wFluct",
            DeltaUFluct => "delta_uFluct",
            DeltaVFluct => "delta_vFluct",
            DeltaWFluct => "delta_wFluct",
            IsRogue => "isRogue",
            IsActive => "isActive",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            ParId => "particle ID",
            TStrt => "particle-release-time",
            SourceIdx => "particle-sourceID",
            D => "diameter of particle",
            M => "mass of particle",
            Wdecay => "non-decay fraction",
            XPosInit => "initial-x-position",
            YPosInit => "initial-y-position",
            ZPosInit => "initial-z-position",
            XPos => "x-position",
            YPos => "y-position",
            ZPos => "z-position",
            UMean => "u-mean-velocity",
            VMean => "v-mean-velocity",
            WMean => "w-mean-velocity",
            UFluct => "u-velocity-fluctuation",
            VFluct => "v-velocity-fluctuation",
            WFluct => "w-velocity-fluctuation",
            DeltaUFluct => "uFluct-difference",
            DeltaVFluct => "vFluct-difference",
            DeltaWFluct => "wFluct-difference",
            IsRogue => "is-particle-rogue",
            IsActive => "is-particle-active",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            ParId | SourceIdx | Wdecay => "--",
            TStrt => "s",
            D => "mu-m",
            M => "g",
            XPosInit | YPosInit | ZPosInit | XPos | YPos | ZPos => "m",
            UMean | VMean | WMean | UFluct | VFluct | WFluct | DeltaUFluct | DeltaVFluct | DeltaWFluct => "m s-1",
            IsRogue | IsActive => "bool",
        }
    }

    /// Identifiers and flags are stored as integers, everything else as floats.
    pub fn is_integer(self) -> bool {
        match self {
            ParId | SourceIdx | IsRogue | IsActive => true,
            _ => false,
        }
    }

    pub fn value(self, p: &Particle) -> Value {
        let float = |v: f64| Value::Float(v as f32);
        let flag = |b: bool| Value::Int(if b { 1 } else { 0 });

        match self {
            ParId => Value::Int(p.par_id as i32),
            SourceIdx => Value::Int(p.source_idx as i32),
            IsRogue => flag(p.is_rogue),
            IsActive => flag(p.is_active),
            TStrt => float(p.t_strt),
            D => float(p.d),
            M => float(p.m),
            Wdecay => float(p.wdecay),
            XPosInit => float(p.pos_init.x),
            YPosInit => float(p.pos_init.y),
            ZPosInit => float(p.pos_init.z),
            XPos => float(p.pos.x),
            YPos => float(p.pos.y),
            ZPos => float(p.pos.z),
            UMean => float(p.uvw_mean.x),
            VMean => float(p.uvw_mean.y),
            WMean => float(p.uvw_mean.z),
            UFluct => float(p.uvw_fluct.x),
            VFluct => float(p.uvw_fluct.y),
            WFluct => float(p.uvw_fluct.z),
            DeltaUFluct => float(p.delta_uvw_fluct.x),
            DeltaVFluct => float(p.delta_uvw_fluct.y),
            DeltaWFluct => float(p.delta_uvw_fluct.z),
        }
    }
}

/// Validated, duplicate free list of fields to write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    fields: Vec<OutputField>,
}

impl FieldSelection {
    /// Resolves requested field names.
    ///
    /// An empty request or one starting with `all` selects every field, one
    /// starting with `minimal` the minimal set. Anything else is added to the
    /// identifier fields. Every name but a leading keyword must be a known
    /// field, also when the keyword already selects it.
    pub fn resolve<S: AsRef<str>>(requested: &[S]) -> Result<FieldSelection> {
        let (mut fields, names) = match requested.split_first() {
            None => (ALL_FIELDS.to_vec(), requested),
            Some((first, rest)) => match first.as_ref() {
                "all" => (ALL_FIELDS.to_vec(), rest),
                "minimal" => (MINIMAL_FIELDS.to_vec(), rest),
                _ => (IDENTIFIER_FIELDS.to_vec(), requested),
            },
        };

        for name in names {
            let name = name.as_ref();
            let field = OutputField::from_name(name).ok_or_else(|| Error::UnknownOutputField(name.to_string()))?;
            fields.push(field);
        }

        let mut unique = Vec::with_capacity(fields.len());
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }

        Ok(FieldSelection { fields: unique })
    }

    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    pub fn contains(&self, field: OutputField) -> bool {
        self.fields.contains(&field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Field names, `all`, or `minimal`.
    pub output_fields: Vec<String>,
    /// Simulated seconds between two staged frames.
    pub output_frequency: f64,
    /// Offset of the first frame from the simulation start, negative or
    /// absent means right at the start.
    pub output_start_time: Option<f64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            output_fields: Vec::new(),
            output_frequency: 1.0,
            output_start_time: None,
        }
    }
}

/// Staged values of one field for every `parID`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

impl Column {
    fn zeroed(field: OutputField, num_par: usize) -> Column {
        if field == ParId {
            Column::Int((0..num_par as i32).collect())
        } else if field.is_integer() {
            Column::Int(vec![0; num_par])
        } else {
            Column::Float(vec![0.0; num_par])
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
        }
    }

    pub fn get(&self, par_id: usize) -> Option<Value> {
        match self {
            Column::Float(v) => v.get(par_id).map(|&v| Value::Float(v)),
            Column::Int(v) => v.get(par_id).map(|&v| Value::Int(v)),
        }
    }

    fn set(&mut self, par_id: usize, value: Value) {
        match (self, value) {
            (Column::Float(v), Value::Float(x)) => v[par_id] = x,
            (Column::Int(v), Value::Int(x)) => v[par_id] = x,
            (_, value) => unreachable!("{:?} staged into a column of the other kind", value),
        }
    }
}

/// Staged frame handed to writers.
pub struct Frame<'a> {
    pub time: f64,
    pub columns: &'a [(OutputField, Column)],
}

/// Persists staged frames.
pub trait OutputWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

/// Keeps copies of all frames in memory.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    pub frames: Vec<(f64, Vec<(OutputField, Column)>)>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        FrameRecorder::default()
    }

    pub fn column(&self, frame: usize, field: OutputField) -> Option<&Column> {
        self.frames
            .get(frame)
            .and_then(|(_, columns)| columns.iter().find(|(f, _)| *f == field))
            .map(|(_, c)| c)
    }
}

impl OutputWriter for FrameRecorder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push((frame.time, frame.columns.to_vec()));
        Ok(())
    }
}

/// Fixed size per-`parID` staging of particle state at a fixed frequency.
///
/// Slots of particles that are not listed when a frame is staged keep the
/// values they were last staged with.
pub struct ParticleOutput {
    next_output_time: f64,
    output_frequency: f64,
    num_par: usize,
    columns: Vec<(OutputField, Column)>,
}

impl ParticleOutput {
    pub fn new(config: &OutputConfig, sim_start: f64, num_par: usize) -> Result<ParticleOutput> {
        let output_frequency = require_positive("output_frequency", config.output_frequency)?;
        let selection = FieldSelection::resolve(&config.output_fields)?;

        let next_output_time = match config.output_start_time {
            Some(offset) if offset >= 0.0 => sim_start + offset,
            _ => sim_start,
        };

        info!(
            "Staging {} fields of {} particles every {} s starting at {} s",
            selection.fields().len(),
            num_par,
            output_frequency,
            next_output_time
        );

        let columns = selection
            .fields()
            .iter()
            .map(|&field| (field, Column::zeroed(field, num_par)))
            .collect();

        Ok(ParticleOutput {
            next_output_time,
            output_frequency,
            num_par,
            columns,
        })
    }

    pub fn next_output_time(&self) -> f64 {
        self.next_output_time
    }

    pub fn output_frequency(&self) -> f64 {
        self.output_frequency
    }

    pub fn num_par(&self) -> usize {
        self.num_par
    }

    pub fn fields<'a>(&'a self) -> impl Iterator<Item = OutputField> + 'a {
        self.columns.iter().map(|(f, _)| *f)
    }

    pub fn column(&self, field: OutputField) -> Option<&Column> {
        self.columns.iter().find(|(f, _)| *f == field).map(|(_, c)| c)
    }

    pub fn staged(&self, field: OutputField, par_id: usize) -> Option<Value> {
        self.column(field).and_then(|c| c.get(par_id))
    }

    /// Stages the listed particles if `time` reached the next output time.
    ///
    /// The next output time then advances by exactly one output frequency,
    /// no matter how far `time` overshot it.
    pub fn save(&mut self, time: f64, store: &ParticleStore) -> bool {
        if !self.is_due(time) {
            return false;
        }

        self.stage(time, store);
        self.next_output_time += self.output_frequency;
        true
    }

    /// Like `save`, additionally hands a staged frame to `writer`.
    ///
    /// The next output time only advances once the frame was written, a
    /// failed write leaves the frame due.
    pub fn save_to<W: OutputWriter>(&mut self, time: f64, store: &ParticleStore, writer: &mut W) -> Result<bool> {
        if !self.is_due(time) {
            return Ok(false);
        }

        self.stage(time, store);
        writer.write_frame(&Frame {
            time,
            columns: &self.columns,
        })?;
        self.next_output_time += self.output_frequency;
        Ok(true)
    }

    pub fn is_due(&self, time: f64) -> bool {
        time >= self.next_output_time
    }

    fn stage(&mut self, time: f64, store: &ParticleStore) {
        for particle in store.listed() {
            if particle.par_id >= self.num_par {
                continue;
            }
            for (field, column) in &mut self.columns {
                column.set(particle.par_id, field.value(particle));
            }
        }

        debug!(
            "Staged {} particles at t = {} s, due at {} s",
            store.listed_count(),
            time,
            self.next_output_time
        );
    }
}
