use crate::{Connection, Connector, Result, TcpConnector};
use faktory_core::Job;
use faktory_protocol::Command;
use tracing::debug;

/// Enqueues jobs for later execution
pub struct Producer<'c, C: Connector = TcpConnector> {
    connection: &'c mut Connection<C>,
}

impl<'c, C: Connector> Producer<'c, C> {
    pub fn new(connection: &'c mut Connection<C>) -> Self {
        Producer { connection }
    }

    /// Push one job. An error reply surfaces as `ClientError::Server`.
    pub fn push(&mut self, job: &Job) -> Result<()> {
        debug!(jid = job.id(), jobtype = job.job_type(), queue = job.queue(), "Pushing job");
        self.connection.send_command(Command::Push(job))?;
        Ok(())
    }

    /// Push jobs one after another, stopping at the first failure
    pub fn push_batch(&mut self, jobs: &[Job]) -> Result<usize> {
        for job in jobs {
            self.push(job)?;
        }
        Ok(jobs.len())
    }
}
