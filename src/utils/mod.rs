pub(crate) mod async_task;
pub(crate) mod scoped_timer;

#[cfg(test)]
mod async_task_test;
