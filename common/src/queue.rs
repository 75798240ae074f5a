use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use thiserror::Error;
use tokio::sync::Notify;

use crate::task::Task;

/// Capacidad por defecto: máximo de tareas que puede sembrar una fase.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cola de tareas llena (capacidad {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Cola FIFO de tareas listas para asignar.
///
/// `push` nunca bloquea (falla si la cola está llena); `pop` espera hasta
/// que haya una tarea. `try_pop` es la variante sin espera que usa el
/// coordinador para responder rápido a los workers.
pub struct TaskQueue {
    inner: Mutex<VecDeque<Task>>,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, task: Task) -> Result<(), QueueFull> {
        {
            let mut queue = self.lock();
            if queue.len() >= self.capacity {
                return Err(QueueFull {
                    capacity: self.capacity,
                });
            }
            queue.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    pub async fn pop(&self) -> Task {
        loop {
            // registrarse antes de mirar la cola para no perder un push intermedio
            let notified = self.notify.notified();
            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[test]
    fn push_y_try_pop_respetan_fifo() {
        let q = TaskQueue::new(8);
        for id in 1..=3 {
            q.push(Task::new_map(id, format!("in-{id}"), 3, 1)).unwrap();
        }

        let ids: Vec<u32> = std::iter::from_fn(|| q.try_pop()).map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn push_falla_con_cola_llena() {
        let q = TaskQueue::new(1);
        q.push(Task::new_reduce(0, 1, 2)).unwrap();

        let err = q.push(Task::new_reduce(1, 1, 2)).unwrap_err();
        assert_eq!(err, QueueFull { capacity: 1 });
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn pop_espera_hasta_que_llega_una_tarea() {
        let q = Arc::new(TaskQueue::new(4));

        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        q.push(Task::new_reduce(7, 1, 8)).unwrap();

        let task = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("pop no despertó")
            .unwrap();
        assert_eq!(task.id, 7);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn cada_tarea_se_entrega_una_sola_vez() {
        let q = Arc::new(TaskQueue::new(64));
        for id in 0..32 {
            q.push(Task::new_reduce(id, 1, 32)).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..8 {
                    got.push(q.pop().await.id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..32).collect::<Vec<_>>());
    }
}
