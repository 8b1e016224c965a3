use crate::interface::HostObject;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ClassTable {
    next_id: u32,
    by_id: HashMap<u32, HostObject>,
    ids: HashMap<HostObject, u32>,
}

impl ClassTable {
    fn new(seed: u32) -> Self {
        ClassTable {
            next_id: seed,
            by_id: HashMap::new(),
            ids: HashMap::new(),
        }
    }
}

/// VM-visible IDs for host objects, one ID space per class.
///
/// Each class starts counting from a small random seed so that a stale or
/// uninitialised ID in the story is unlikely to name a live object. IDs are
/// never handed out twice.
#[derive(Debug, Clone)]
pub struct ObjectTables {
    classes: Vec<ClassTable>,
}

impl ObjectTables {
    pub fn new<R: Rng>(class_count: u32, rng: &mut R) -> Self {
        ObjectTables {
            classes: (0..class_count)
                .map(|_| ClassTable::new(rng.gen::<u32>() % 101 + 1))
                .collect(),
        }
    }

    pub fn class_count(&self) -> u32 {
        self.classes.len() as u32
    }

    pub fn register(&mut self, class: u32, obj: HostObject) -> Option<u32> {
        let table = self.classes.get_mut(class as usize)?;
        if let Some(&id) = table.ids.get(&obj) {
            return Some(id);
        }
        let id = table.next_id;
        table.next_id = match table.next_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        table.by_id.insert(id, obj);
        table.ids.insert(obj, id);
        Some(id)
    }

    pub fn unregister(&mut self, class: u32, obj: HostObject) -> Option<u32> {
        let table = self.classes.get_mut(class as usize)?;
        let id = table.ids.remove(&obj)?;
        table.by_id.remove(&id);
        Some(id)
    }

    pub fn lookup(&self, class: u32, id: u32) -> Option<HostObject> {
        self.classes.get(class as usize)?.by_id.get(&id).copied()
    }

    pub fn id_of(&self, class: u32, obj: HostObject) -> Option<u32> {
        self.classes.get(class as usize)?.ids.get(&obj).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IntArray {
    addr: u32,
    data: Vec<u32>,
    retained: bool,
}

/// Integer arrays copied out of VM memory for the duration of a glk call,
/// or longer when the host retains them.
#[derive(Debug, Clone, Default)]
pub struct ArrayTable {
    next_id: u32,
    arrays: HashMap<u32, IntArray>,
}

impl ArrayTable {
    pub fn capture(&mut self, addr: u32, data: Vec<u32>, retained: bool) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.arrays.insert(
            self.next_id,
            IntArray {
                addr,
                data,
                retained,
            },
        );
        self.next_id
    }

    pub fn get(&self, id: u32) -> Option<&[u32]> {
        self.arrays.get(&id).map(|a| &a.data[..])
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut [u32]> {
        self.arrays.get_mut(&id).map(|a| &mut a.data[..])
    }

    pub fn retain(&mut self, id: u32) -> bool {
        match self.arrays.get_mut(&id) {
            Some(array) => {
                array.retained = true;
                true
            }
            None => false,
        }
    }

    pub fn is_retained(&self, id: u32) -> bool {
        self.arrays.get(&id).map_or(false, |a| a.retained)
    }

    // the VM address and final contents
    pub fn take(&mut self, id: u32) -> Option<(u32, Vec<u32>)> {
        self.arrays.remove(&id).map(|a| (a.addr, a.data))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    pub objects: ObjectTables,
    pub arrays: ArrayTable,
}

impl Registry {
    pub fn new<R: Rng>(class_count: u32, rng: &mut R) -> Self {
        Registry {
            objects: ObjectTables::new(class_count, rng),
            arrays: ArrayTable::default(),
        }
    }
}
