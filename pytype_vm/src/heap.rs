//! Arena storage for objects with identity.
//!
//! Classes, functions, instances and finished frames are referenced by index.
//! Nothing is ever removed, so ids stay valid for the life of the heap.

use crate::frame::Frame;
use crate::values::{ClassData, FunctionData, InstanceData};

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }

            #[cfg(test)]
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index)
            }
        }
    };
}

define_id!(ClassId);
define_id!(FunctionId);
define_id!(InstanceId);
define_id!(FrameId);

#[derive(Debug, Default)]
pub struct Heap {
    classes: Vec<ClassData>,
    functions: Vec<FunctionData>,
    instances: Vec<InstanceData>,
    frames: Vec<Frame>,
}

impl Heap {
    pub fn add_class(&mut self, data: ClassData) -> ClassId {
        self.classes.push(data);
        ClassId(self.classes.len() - 1)
    }

    pub fn class(&self, id: ClassId) -> &ClassData {
        &self.classes[id.0]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassData {
        &mut self.classes[id.0]
    }

    pub fn add_function(&mut self, data: FunctionData) -> FunctionId {
        self.functions.push(data);
        FunctionId(self.functions.len() - 1)
    }

    pub fn function(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id.0]
    }

    pub fn add_instance(&mut self, data: InstanceData) -> InstanceId {
        self.instances.push(data);
        InstanceId(self.instances.len() - 1)
    }

    pub fn instance(&self, id: InstanceId) -> &InstanceData {
        &self.instances[id.0]
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut InstanceData {
        &mut self.instances[id.0]
    }

    /// Store a frame that has finished running.
    pub fn add_frame(&mut self, frame: Frame) -> FrameId {
        self.frames.push(frame);
        FrameId(self.frames.len() - 1)
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frames(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(index, frame)| (FrameId(index), frame))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
