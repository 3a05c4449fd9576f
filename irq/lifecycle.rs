//! GIC lifecycle controller
//!
//! Sequences the driver capability through cluster boot, per-core bring-up,
//! CPU interface toggling and save/restore across core and cluster
//! power-down. One controller instance exists per boot image; every entry
//! point takes `&mut self` and the power-domain coordinator serializes calls.

use heapless::Vec;

use crate::arch::{current_mpidr, Mpidr};
use crate::config::GicConfig;
use crate::irq::context::{ClusterSnapshot, ContextStore, CoreSet, SavedContext};
use crate::irq::driver::{DriverError, GicDriver, Operation};
use crate::irq::topology::{CoreIndex, CoreResolver, Topology};
use crate::irq::{LifecycleState, MAX_CORES};
use crate::{CoreRef, Error, Result};

/// Per-core handle returned by [`GicLifecycle::suspend`]
pub type CoreContext<D> =
    SavedContext<<D as GicDriver>::DistributorState, <D as GicDriver>::RedistributorState>;

/// Store returned by [`GicLifecycle::suspend_cluster`]
pub type ClusterContext<D> =
    ContextStore<<D as GicDriver>::DistributorState, <D as GicDriver>::RedistributorState>;

type DistributorSnapshot<D> = ClusterSnapshot<<D as GicDriver>::DistributorState>;

/// Lifecycle record of one core
#[derive(Debug, Clone, Copy)]
struct CoreSlot {
    state: LifecycleState,
    cpuif_enabled: bool,
    /// Epoch of the save that suspended the core
    epoch: Option<u32>,
}

impl Default for CoreSlot {
    fn default() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            cpuif_enabled: false,
            epoch: None,
        }
    }
}

/// GIC lifecycle controller
pub struct GicLifecycle<D: GicDriver, T: CoreResolver = Topology> {
    config: GicConfig,
    driver: D,
    topology: T,
    /// Cluster machine: `Uninitialized` or `DistributorReady`
    cluster: LifecycleState,
    driver_ready: bool,
    /// Epoch of the distributor save while the cluster is powered down
    cluster_lost: Option<u32>,
    cores: Vec<CoreSlot, MAX_CORES>,
    next_epoch: u32,
}

impl<D: GicDriver, T: CoreResolver> GicLifecycle<D, T> {
    /// Create a controller
    ///
    /// The topology must cover exactly `config.core_count` cores.
    pub fn new(config: GicConfig, driver: D, topology: T) -> Result<Self> {
        config.validate()?;

        if topology.core_count() != config.core_count {
            return Err(Error::InvalidConfig(
                "topology core count differs from configuration",
            ));
        }

        let mut cores = Vec::new();
        for _ in 0..config.core_count {
            cores
                .push(CoreSlot::default())
                .map_err(|_| Error::InvalidConfig("core count exceeds MAX_CORES"))?;
        }

        log::debug!(
            "GIC: controller for {} cores, GICD {:#x}, GICR {:#x}",
            config.core_count,
            config.gicd_base,
            config.gicr_base
        );

        Ok(Self {
            config,
            driver,
            topology,
            cluster: LifecycleState::Uninitialized,
            driver_ready: false,
            cluster_lost: None,
            cores,
            next_epoch: 1,
        })
    }

    pub fn config(&self) -> &GicConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Consume the controller and hand the driver back
    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    /// Resolve a hardware MPIDR to its logical index
    pub fn core_index(&self, mpidr: Mpidr) -> Result<CoreIndex> {
        self.topology.resolve(mpidr)
    }

    /// Logical index of the calling core
    pub fn this_core(&self) -> Result<CoreIndex> {
        let mpidr = current_mpidr().ok_or(Error::InvalidConfig(
            "MPIDR is not readable on this target",
        ))?;
        self.topology.resolve(mpidr)
    }

    /// Cluster state: `Uninitialized` or `DistributorReady`
    pub fn cluster_state(&self) -> LifecycleState {
        self.cluster
    }

    /// Lifecycle state of `core`
    pub fn core_state(&self, core: CoreIndex) -> Result<LifecycleState> {
        self.slot(core).map(|slot| slot.state)
    }

    /// Whether interrupt delivery to `core` is enabled
    pub fn cpuif_enabled(&self, core: CoreIndex) -> Result<bool> {
        self.slot(core).map(|slot| slot.cpuif_enabled)
    }

    /// Cores currently in `CoreActive`
    pub fn active_cores(&self) -> CoreSet {
        self.cores
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == LifecycleState::CoreActive)
            .map(|(i, _)| CoreIndex::new(i))
            .collect()
    }

    /// Whether the distributor context is lost until a restore
    pub fn cluster_context_lost(&self) -> bool {
        self.cluster_lost.is_some()
    }

    /// Cluster boot by the first core
    ///
    /// Initializes the driver (when this stage owns it) and the distributor,
    /// unless the distributor is already live, then brings up `core`.
    pub fn boot(&mut self, core: CoreIndex) -> Result<()> {
        self.slot(core)?;

        if self.cluster == LifecycleState::DistributorReady {
            log::warn!("GIC: boot repeated on core {}", core);
            return Err(Error::DoubleInit {
                op: Operation::Boot,
                core: Some(core),
                state: self.cluster,
            });
        }

        if self.config.stage.owns_driver() && !self.driver_ready {
            self.driver
                .driver_init(&self.config)
                .map_err(|e| self.fault(Operation::DriverInit, None, e))?;
            self.driver_ready = true;
            log::info!(
                "GIC: driver initialized, {} secure interrupt(s)",
                self.config.interrupt_props.len()
            );
        }

        if self.driver.distributor_enabled() {
            log::info!("GIC: distributor already enabled, skipping init");
        } else {
            self.driver
                .distributor_init()
                .map_err(|e| self.fault(Operation::DistributorInit, None, e))?;
            log::info!("GIC: distributor initialized");
        }
        self.cluster = LifecycleState::DistributorReady;

        self.bring_up(core, Operation::Boot)
    }

    /// Bring-up of a further core after boot
    pub fn secondary_bring_up(&mut self, core: CoreIndex) -> Result<()> {
        self.slot(core)?;

        if self.cluster != LifecycleState::DistributorReady {
            log::warn!("GIC: core {} brought up before cluster boot", core);
            return Err(Error::InvalidTransition {
                op: Operation::SecondaryBringUp,
                core: None,
                state: self.cluster,
            });
        }

        self.bring_up(core, Operation::SecondaryBringUp)
    }

    fn bring_up(&mut self, core: CoreIndex, op: Operation) -> Result<()> {
        let state = self.slot(core)?.state;

        match state {
            LifecycleState::CoreActive => {
                log::warn!("GIC: core {} already active", core);
                return Err(Error::DoubleInit {
                    op,
                    core: Some(core),
                    state,
                });
            }
            // Cold entry of a suspended core discards its saved context,
            // which is only sound while the distributor is live
            LifecycleState::Uninitialized | LifecycleState::CoreSuspended
                if self.cluster_lost.is_none() => {}
            _ => {
                log::warn!("GIC: core {} cannot be brought up from {:?}", core, state);
                return Err(Error::InvalidTransition {
                    op,
                    core: Some(core),
                    state,
                });
            }
        }

        self.driver
            .redistributor_init(core)
            .map_err(|e| self.fault(Operation::RedistributorInit, Some(core), e))?;
        self.cores[core.get()] = CoreSlot {
            state: LifecycleState::CoreActive,
            ..CoreSlot::default()
        };

        self.driver
            .interface_enable(core)
            .map_err(|e| self.fault(Operation::CpuifEnable, Some(core), e))?;
        self.cores[core.get()].cpuif_enabled = true;

        log::info!("GIC: core {} online", core);
        Ok(())
    }

    /// Enable interrupt delivery to an active core
    ///
    /// The driver is called even when delivery is already enabled.
    pub fn cpuif_enable(&mut self, core: CoreIndex) -> Result<()> {
        self.require_active(core, Operation::CpuifEnable)?;

        if self.cores[core.get()].cpuif_enabled {
            log::debug!("GIC: cpu interface of core {} already enabled", core);
        }

        self.driver
            .interface_enable(core)
            .map_err(|e| self.fault(Operation::CpuifEnable, Some(core), e))?;
        self.cores[core.get()].cpuif_enabled = true;
        Ok(())
    }

    /// Gate interrupt delivery to an active core; the core stays `CoreActive`
    pub fn cpuif_disable(&mut self, core: CoreIndex) -> Result<()> {
        self.require_active(core, Operation::CpuifDisable)?;

        self.driver
            .interface_disable(core)
            .map_err(|e| self.fault(Operation::CpuifDisable, Some(core), e))?;
        self.cores[core.get()].cpuif_enabled = false;
        log::debug!("GIC: cpu interface of core {} disabled", core);
        Ok(())
    }

    /// Save context of `core` before it powers down
    ///
    /// When no other core is still powered, the distributor is saved too and
    /// the returned handle carries the cluster snapshot.
    pub fn suspend(&mut self, core: CoreIndex) -> Result<CoreContext<D>> {
        self.require_active(core, Operation::Suspend)?;

        if self.cores[core.get()].cpuif_enabled {
            self.driver
                .interface_disable(core)
                .map_err(|e| self.fault(Operation::CpuifDisable, Some(core), e))?;
            self.cores[core.get()].cpuif_enabled = false;
        }

        let redistributor = self
            .driver
            .redistributor_save(core)
            .map_err(|e| self.fault(Operation::RedistributorSave, Some(core), e))?;
        let epoch = self.take_epoch();

        let last_out = !self
            .cores
            .iter()
            .enumerate()
            .any(|(i, slot)| i != core.get() && slot.state.is_powered());

        let cluster = if last_out {
            let state = self
                .driver
                .distributor_save()
                .map_err(|e| self.fault(Operation::DistributorSave, Some(core), e))?;
            self.cluster_lost = Some(epoch);
            log::debug!("GIC: core {} is last out, distributor saved", core);
            Some(ClusterSnapshot::new(epoch, state))
        } else {
            None
        };

        let slot = &mut self.cores[core.get()];
        slot.state = LifecycleState::CoreSuspended;
        slot.epoch = Some(epoch);

        log::debug!("GIC: core {} suspended, epoch {}", core, epoch);
        Ok(SavedContext::new(core, epoch, redistributor, cluster))
    }

    /// Restore context of `core` from the handle its last suspend returned
    ///
    /// If the cluster was powered down, the handle must carry the matching
    /// distributor snapshot, which is restored before the redistributor.
    ///
    /// A driver fault during the restore leaves the core in `Restoring`.
    /// That state is terminal: the handle is no longer accepted and a retried
    /// `resume` reports `RestoreWithoutSave` with state `Restoring`. Recovery
    /// is a partition reset.
    pub fn resume(&mut self, core: CoreIndex, ctx: &CoreContext<D>) -> Result<()> {
        self.slot(core)?;
        self.check_handle(core, ctx)?;
        let cluster = self.check_cluster(core, ctx.cluster())?;

        self.cores[core.get()].state = LifecycleState::Restoring;

        if let Some(cluster) = cluster {
            self.restore_distributor(core, cluster)?;
        }
        self.restore_core(core, ctx)?;
        self.enable_restored(core)?;

        log::debug!("GIC: core {} resumed", core);
        Ok(())
    }

    /// Save every core in `cores`, then the distributor if the cluster empties
    ///
    /// All cores must be `CoreActive`; nothing is saved otherwise. If a save
    /// fails part way, the cores already suspended are restored and delivery
    /// is re-enabled where it was on, then the driver error is returned.
    pub fn suspend_cluster(&mut self, cores: CoreSet) -> Result<ClusterContext<D>> {
        if cores.is_empty() {
            return Err(Error::InvalidTransition {
                op: Operation::Suspend,
                core: None,
                state: self.cluster,
            });
        }

        for core in cores.iter() {
            self.require_active(core, Operation::Suspend)?;
        }

        let delivery: CoreSet = cores
            .iter()
            .filter(|core| self.cores[core.get()].cpuif_enabled)
            .collect();

        let mut store = ContextStore::new(self.cores.len())?;
        for core in cores.iter() {
            match self.suspend(core) {
                Ok(mut ctx) => {
                    if let Some(cluster) = ctx.take_cluster() {
                        store.set_cluster(cluster);
                    }
                    store.insert(ctx);
                }
                Err(err) => {
                    self.roll_back_suspend(&mut store, delivery);
                    return Err(err);
                }
            }
        }

        log::info!("GIC: cluster suspended, cores {:?}", cores);
        Ok(store)
    }

    /// Restore every core held in `store`
    ///
    /// Handles and the cluster snapshot are checked before any driver call.
    /// The distributor is restored first, then every redistributor, then
    /// delivery is re-enabled. On success the store is drained.
    pub fn resume_cluster(&mut self, store: &mut ClusterContext<D>) -> Result<()> {
        let cores = store.cores();
        let lead = match cores.iter().next() {
            Some(core) => core,
            None => {
                return Err(Error::InvalidTransition {
                    op: Operation::Resume,
                    core: None,
                    state: self.cluster,
                })
            }
        };

        for core in cores.iter() {
            self.slot(core)?;
            if let Some(ctx) = store.get(core) {
                self.check_handle(core, ctx)?;
            }
        }
        let cluster = self.check_cluster(lead, store.cluster())?;

        for core in cores.iter() {
            self.cores[core.get()].state = LifecycleState::Restoring;
        }

        if let Some(cluster) = cluster {
            self.restore_distributor(lead, cluster)?;
        }
        for core in cores.iter() {
            if let Some(ctx) = store.get(core) {
                self.restore_core(core, ctx)?;
            }
        }
        for core in cores.iter() {
            self.enable_restored(core)?;
        }

        for core in cores.iter() {
            store.take(core);
        }
        store.take_cluster();

        log::info!("GIC: cluster resumed, cores {:?}", cores);
        Ok(())
    }

    /// Undo a partial cluster suspend; stops at the first driver fault
    fn roll_back_suspend(&mut self, store: &mut ClusterContext<D>, delivery: CoreSet) {
        for core in store.cores().iter() {
            if let Some(ctx) = store.take(core) {
                if let Err(err) = self.restore_core(core, &ctx) {
                    log::error!("GIC: rollback of core {} failed: {}", core, err);
                    return;
                }
            }
        }

        for core in delivery.iter() {
            let slot = self.cores[core.get()];
            if slot.state == LifecycleState::CoreActive && !slot.cpuif_enabled {
                if let Err(err) = self.enable_restored(core) {
                    log::error!("GIC: rollback of core {} failed: {}", core, err);
                    return;
                }
            }
        }

        log::warn!("GIC: cluster suspend rolled back");
    }

    fn slot(&self, core: CoreIndex) -> Result<&CoreSlot> {
        self.cores
            .get(core.get())
            .ok_or(Error::UnknownCore(CoreRef::Index(core.get())))
    }

    fn require_active(&self, core: CoreIndex, op: Operation) -> Result<()> {
        let state = self.slot(core)?.state;
        if state != LifecycleState::CoreActive {
            log::warn!("GIC: {} on core {} in state {:?}", op.as_str(), core, state);
            return Err(Error::InvalidTransition {
                op,
                core: Some(core),
                state,
            });
        }
        Ok(())
    }

    /// Only the handle from the latest save of this core is accepted
    fn check_handle(&self, core: CoreIndex, ctx: &CoreContext<D>) -> Result<()> {
        let slot = self.slot(core)?;
        let valid = slot.state == LifecycleState::CoreSuspended
            && ctx.core() == core
            && slot.epoch == Some(ctx.epoch());

        if !valid {
            log::warn!(
                "GIC: core {} has no save matching handle (core {}, epoch {})",
                core,
                ctx.core(),
                ctx.epoch()
            );
            return Err(Error::RestoreWithoutSave {
                op: Operation::RedistributorRestore,
                core,
                state: slot.state,
            });
        }
        Ok(())
    }

    /// Pick the distributor snapshot to restore, if the cluster needs one
    fn check_cluster<'a>(
        &self,
        core: CoreIndex,
        snapshot: Option<&'a DistributorSnapshot<D>>,
    ) -> Result<Option<&'a DistributorSnapshot<D>>> {
        match (self.cluster_lost, snapshot) {
            (Some(epoch), Some(snapshot)) if snapshot.epoch() == epoch => Ok(Some(snapshot)),
            (Some(epoch), _) => {
                log::warn!(
                    "GIC: core {} is first in but carries no distributor snapshot for epoch {}",
                    core,
                    epoch
                );
                Err(Error::RestoreWithoutSave {
                    op: Operation::DistributorRestore,
                    core,
                    state: self.slot(core)?.state,
                })
            }
            (None, Some(snapshot)) => {
                log::debug!(
                    "GIC: distributor is live, ignoring snapshot of epoch {}",
                    snapshot.epoch()
                );
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    fn restore_distributor(
        &mut self,
        core: CoreIndex,
        cluster: &DistributorSnapshot<D>,
    ) -> Result<()> {
        self.driver
            .distributor_restore(cluster.state())
            .map_err(|e| self.fault(Operation::DistributorRestore, Some(core), e))?;
        self.cluster_lost = None;
        log::debug!(
            "GIC: distributor restored by core {}, epoch {}",
            core,
            cluster.epoch()
        );
        Ok(())
    }

    fn restore_core(&mut self, core: CoreIndex, ctx: &CoreContext<D>) -> Result<()> {
        self.driver
            .redistributor_restore(core, ctx.redistributor())
            .map_err(|e| self.fault(Operation::RedistributorRestore, Some(core), e))?;

        let slot = &mut self.cores[core.get()];
        slot.state = LifecycleState::CoreActive;
        slot.epoch = None;
        Ok(())
    }

    fn enable_restored(&mut self, core: CoreIndex) -> Result<()> {
        self.driver
            .interface_enable(core)
            .map_err(|e| self.fault(Operation::CpuifEnable, Some(core), e))?;
        self.cores[core.get()].cpuif_enabled = true;
        Ok(())
    }

    fn take_epoch(&mut self) -> u32 {
        let epoch = self.next_epoch;
        // Zero is never handed out
        self.next_epoch = self.next_epoch.wrapping_add(1).max(1);
        epoch
    }

    fn fault(&self, op: Operation, core: Option<CoreIndex>, fault: DriverError) -> Error {
        let state = core
            .and_then(|core| self.cores.get(core.get()))
            .map_or(self.cluster, |slot| slot.state);

        match core {
            Some(core) => {
                log::error!("GIC: {} failed on core {}: {:?}", op.as_str(), core, fault)
            }
            None => log::error!("GIC: {} failed: {:?}", op.as_str(), fault),
        }

        Error::DriverFault {
            op,
            core,
            state,
            fault,
        }
    }
}
