//! Setting up an in-process fabric and running ranks on it

use super::{LocalFabric, Traffic};
use crate::{Error, Fabric, Rank};
use log::{debug, info};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    thread,
};

/// Fully connected set of fabric endpoints, one per rank
#[derive(Debug)]
pub struct World {
    /// Endpoint of each rank, in rank order
    endpoints: Vec<LocalFabric>,
}
//
impl World {
    /// Connect `num_tasks` ranks to each other
    pub fn new(num_tasks: usize) -> Result<Self, Error> {
        if num_tasks == 0 {
            return Err(Error::EmptyWorld);
        }

        // channels[src][dst] carries messages from src to dst
        let mut outboxes = Vec::with_capacity(num_tasks);
        let mut inboxes = (0..num_tasks)
            .map(|_| Vec::with_capacity(num_tasks))
            .collect::<Vec<_>>();
        for _src in 0..num_tasks {
            let mut row = Vec::with_capacity(num_tasks);
            for inbox in &mut inboxes {
                let (sender, receiver) = crossbeam_channel::unbounded();
                row.push(sender);
                inbox.push(receiver);
            }
            outboxes.push(row);
        }

        let endpoints = outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalFabric {
                rank,
                outboxes: outboxes.into_boxed_slice(),
                inboxes: inboxes.into_boxed_slice(),
                stash: RefCell::new((0..num_tasks).map(|_| VecDeque::new()).collect()),
                traffic: Cell::new(Traffic::default()),
            })
            .collect();
        debug!("Connected {num_tasks} ranks");
        Ok(Self { endpoints })
    }

    /// Number of ranks
    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Split the world into per-rank endpoints, in rank order
    pub fn into_endpoints(self) -> Vec<LocalFabric> {
        self.endpoints
    }
}

/// Run `body` on every rank of a new `num_tasks`-rank fabric, each rank
/// having its own thread, and collect the per-rank results in rank order
///
/// If a rank panics, the panic is propagated once all ranks are done.
pub fn launch<T, F>(num_tasks: usize, body: F) -> Result<Vec<T>, Error>
where
    T: Send,
    F: Fn(LocalFabric) -> T + Sync,
{
    let endpoints = World::new(num_tasks)?.into_endpoints();
    info!("Launching {num_tasks} ranks");
    let body = &body;
    thread::scope(|scope| -> Result<Vec<T>, Error> {
        let handles = endpoints
            .into_iter()
            .map(|comm| {
                let rank: Rank = comm.rank();
                thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || body(comm))
                    .map_err(|source| Error::Spawn { rank, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_world_is_an_error() {
        assert!(matches!(World::new(0), Err(Error::EmptyWorld)));
        assert!(matches!(launch(0, |_| ()), Err(Error::EmptyWorld)));
    }

    #[test]
    fn ranks_see_their_own_identity() -> Result<(), Error> {
        let world = World::new(3)?;
        assert_eq!(world.size(), 3);
        for (rank, comm) in world.into_endpoints().into_iter().enumerate() {
            assert_eq!(comm.rank(), rank);
            assert_eq!(comm.size(), 3);
        }

        let ranks = launch(6, |comm| (comm.rank(), comm.size()))?;
        assert_eq!(ranks, (0..6).map(|rank| (rank, 6)).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn ranks_run_on_named_threads() -> Result<(), Error> {
        let names = launch(2, |_| thread::current().name().map(str::to_owned))?;
        assert_eq!(
            names,
            vec![Some("rank-0".to_owned()), Some("rank-1".to_owned())]
        );
        Ok(())
    }
}
