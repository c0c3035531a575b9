use chrono::NaiveDate;

use crate::models::Task;

/// Most tasks shown in the due view.
pub const DUE_TASK_LIMIT: usize = 16;

/// Tasks due on or before `today`, earliest first and higher priority first
/// within a day, capped at [`DUE_TASK_LIMIT`]. Undated tasks are left out.
pub fn due_view(tasks: Vec<Task>, today: NaiveDate) -> Vec<Task> {
    let mut due: Vec<(NaiveDate, Task)> = tasks
        .into_iter()
        .filter_map(|task| {
            let date = task.due_date().filter(|date| *date <= today)?;
            Some((date, task))
        })
        .collect();

    due.sort_by(|(a_date, a), (b_date, b)| {
        a_date.cmp(b_date).then_with(|| b.priority.cmp(&a.priority))
    });

    due.into_iter()
        .take(DUE_TASK_LIMIT)
        .map(|(_, task)| task)
        .collect()
}
