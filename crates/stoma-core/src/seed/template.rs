//! Fixed demo content written by the seeder.

use chrono::{Days, NaiveDate};

use stoma_db::models::{Frequency, PlanStatus};
use stoma_db::queries::care_plan_items::ItemDraft;
use stoma_db::queries::care_plans::NewCarePlan;

pub const DEMO_PLAN_TITLE: &str = "造口日常护理计划";

/// Length of the demo plan.
pub const DEMO_PLAN_DAYS: u64 = 90;

/// (title, description, target_value) of every demo task, in display order.
const DEMO_ITEMS: [(&str, &str, &str); 8] = [
    ("造口袋更换", "检查造口袋密封情况，渗漏或粘贴不牢时及时更换", "每3-5天1次"),
    ("造口周围皮肤清洁", "用温水清洁造口周围皮肤，保持干燥，避免使用刺激性清洁剂", "每日2次"),
    ("观察造口颜色", "正常造口呈红色或粉红色、湿润，发现发黑、发白及时就医", "每日1次"),
    ("记录排泄情况", "记录排泄物的量、颜色和性状", "每日记录"),
    ("饮食管理", "规律进食，少食产气及易致腹泻的食物，多饮水", "每日3餐"),
    ("适量运动", "散步等轻度活动，避免提重物和剧烈运动", "每日30分钟"),
    ("心理调适", "与家人或病友交流，必要时寻求专业心理支持", "每周2次"),
    ("复诊随访", "按时到造口门诊复查，评估造口及周围皮肤情况", "每月1次"),
];

/// Number of items in the demo template.
pub const DEMO_ITEM_COUNT: usize = DEMO_ITEMS.len();

/// The demo plan starting on `start`.
pub fn demo_plan(start: NaiveDate) -> NewCarePlan {
    let end_date = start
        .checked_add_days(Days::new(DEMO_PLAN_DAYS))
        .unwrap_or(NaiveDate::MAX);

    NewCarePlan {
        title: DEMO_PLAN_TITLE.to_owned(),
        description: "造口术后居家自我护理的日常任务".to_owned(),
        start_date: start,
        end_date,
        frequency: Frequency::Daily,
        status: PlanStatus::Active,
        notes: "如出现造口出血、回缩或周围皮肤破溃，请及时联系护士".to_owned(),
    }
}

/// The demo task list.
pub fn demo_items() -> Vec<ItemDraft> {
    DEMO_ITEMS
        .iter()
        .map(|(title, description, target)| ItemDraft::new(*title, *description, *target))
        .collect()
}
