use std::cell::RefCell;
use std::rc::Rc;

use object::{InstanceId, SlotNameId};

use crate::VM;

/// Change to an instance announced to the pattern network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    Assert,
    /// A reactive slot changed; carries the slot name.
    Modify,
    Retract,
}

/// Consumer of instance changes and owner of logical support.
///
/// The runtime takes the network out of the VM for the duration of a
/// callback; actions raised by the callback itself are queued and
/// delivered once it returns.
pub trait ObjectNetwork {
    fn action(
        &mut self,
        vm: &mut VM,
        kind: NetworkAction,
        instance: InstanceId,
        slot: Option<SlotNameId>,
    );

    /// Record logical dependencies for a newly built instance. `false`
    /// means the supporting match was retracted and the instance must go.
    fn add_logical_dependencies(&mut self, _vm: &mut VM, _instance: InstanceId) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub kind: NetworkAction,
    pub instance: InstanceId,
    pub slot: Option<SlotNameId>,
}

/// Network that only records what it is told, optionally withdrawing
/// logical support.
#[derive(Debug, Clone, Default)]
pub struct RecordingNetwork {
    pub events: Rc<RefCell<Vec<NetworkEvent>>>,
    pub withdraw_support: bool,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectNetwork for RecordingNetwork {
    fn action(
        &mut self,
        _vm: &mut VM,
        kind: NetworkAction,
        instance: InstanceId,
        slot: Option<SlotNameId>,
    ) {
        self.events.borrow_mut().push(NetworkEvent {
            kind,
            instance,
            slot,
        });
    }

    fn add_logical_dependencies(&mut self, _vm: &mut VM, _instance: InstanceId) -> bool {
        !self.withdraw_support
    }
}

impl VM {
    pub fn set_network(&mut self, network: Box<dyn ObjectNetwork>) {
        self.network = Some(network);
    }

    pub fn take_network(&mut self) -> Option<Box<dyn ObjectNetwork>> {
        self.network.take()
    }

    /// Pattern matching is running; reactive instances may not be created
    /// or deleted.
    pub fn set_join_in_progress(&mut self, value: bool) {
        self.join_in_progress = value;
    }

    pub fn join_in_progress(&self) -> bool {
        self.join_in_progress
    }

    pub(crate) fn notify_network(
        &mut self,
        kind: NetworkAction,
        instance: InstanceId,
        slot: Option<SlotNameId>,
    ) {
        if self.network_busy {
            self.pending_network.push((kind, instance, slot));
            return;
        }
        let Some(mut network) = self.network.take() else {
            return;
        };
        self.network_busy = true;
        log::trace!("network {:?} {:?} {:?}", kind, instance, slot);
        network.action(self, kind, instance, slot);
        self.drain_pending(network.as_mut());
        self.network_busy = false;
        self.network = Some(network);
    }

    fn drain_pending(&mut self, network: &mut dyn ObjectNetwork) {
        while !self.pending_network.is_empty() {
            let queued = std::mem::take(&mut self.pending_network);
            for (kind, instance, slot) in queued {
                network.action(self, kind, instance, slot);
            }
        }
    }

    pub(crate) fn logical_dependencies(&mut self, instance: InstanceId) -> bool {
        if self.network_busy {
            return true;
        }
        let Some(mut network) = self.network.take() else {
            return true;
        };
        self.network_busy = true;
        let supported = network.add_logical_dependencies(self, instance);
        self.drain_pending(network.as_mut());
        self.network_busy = false;
        self.network = Some(network);
        supported
    }
}
