//! Typed attribute values and the lock-guarded attribute store.

use parking_lot::RwLock;

use crate::ids::NodeIndex;
use crate::pool::PoseHandle;

/// A value living in a parameter slot or on a node output port.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Float(f32),
    Bool(bool),
    Int(i32),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
    /// Quaternion (x, y, z, w)
    Rotation([f32; 4]),
    /// Pose currently checked out for this port, if any.
    Pose(Option<PoseHandle>),
    /// Motion node whose playback instance this port exposes.
    MotionInstance(Option<NodeIndex>),
}

impl Attribute {
    pub fn type_name(&self) -> &'static str {
        match self {
            Attribute::Float(_) => "float",
            Attribute::Bool(_) => "bool",
            Attribute::Int(_) => "int",
            Attribute::Vector2(_) => "vector2",
            Attribute::Vector3(_) => "vector3",
            Attribute::Vector4(_) => "vector4",
            Attribute::Rotation(_) => "rotation",
            Attribute::Pose(_) => "pose",
            Attribute::MotionInstance(_) => "motion_instance",
        }
    }

    /// Same variant, ignoring the payload.
    #[inline]
    pub fn same_type(&self, other: &Attribute) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Numeric read with int/bool promotion.
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Attribute::Float(v) => Some(v),
            Attribute::Int(v) => Some(v as f32),
            Attribute::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Attribute::Bool(v) => Some(v),
            Attribute::Float(v) => Some(v != 0.0),
            Attribute::Int(v) => Some(v != 0),
            _ => None,
        }
    }

    /// Float values truncate toward zero.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Attribute::Int(v) => Some(v),
            Attribute::Float(v) => Some(v as i32),
            Attribute::Bool(v) => Some(v as i32),
            _ => None,
        }
    }

    /// Vector read; 2-component vectors get z = 0, 4-component vectors drop w.
    pub fn as_vec3(&self) -> Option<[f32; 3]> {
        match *self {
            Attribute::Vector3(v) => Some(v),
            Attribute::Vector2([x, y]) => Some([x, y, 0.0]),
            Attribute::Vector4([x, y, z, _]) => Some([x, y, z]),
            Attribute::Float(v) => Some([v; 3]),
            _ => None,
        }
    }

    pub fn as_rotation(&self) -> Option<[f32; 4]> {
        match *self {
            Attribute::Rotation(q) | Attribute::Vector4(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_pose(&self) -> Option<PoseHandle> {
        match *self {
            Attribute::Pose(h) => h,
            _ => None,
        }
    }
}

/// Positional attribute storage.
///
/// Structural edits through `&self` take the write lock so a loader thread can
/// resize the store while another thread inspects it. The per-frame path goes
/// through `&mut self` accessors, which reach the data without locking.
#[derive(Debug, Default)]
pub struct AttributeStore {
    values: RwLock<Vec<Attribute>>,
}

impl AttributeStore {
    pub fn new(values: Vec<Attribute>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Clone of one slot, read under the lock.
    pub fn read(&self, index: usize) -> Option<Attribute> {
        self.values.read().get(index).cloned()
    }

    pub fn push(&self, value: Attribute) {
        self.values.write().push(value);
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, value: Attribute) {
        let mut values = self.values.write();
        let at = index.min(values.len());
        values.insert(at, value);
    }

    pub fn remove(&self, index: usize) -> Option<Attribute> {
        let mut values = self.values.write();
        (index < values.len()).then(|| values.remove(index))
    }

    pub fn replace_all(&self, values: Vec<Attribute>) {
        *self.values.write() = values;
    }

    /// Overwrite one slot under the lock. Returns false if out of range.
    pub fn write(&self, index: usize, value: Attribute) -> bool {
        match self.values.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn get(&mut self, index: usize) -> Option<&Attribute> {
        self.values.get_mut().get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Attribute> {
        self.values.get_mut().get_mut(index)
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Attribute] {
        self.values.get_mut().as_mut_slice()
    }

    pub fn snapshot(&self) -> Vec<Attribute> {
        self.values.read().clone()
    }
}
