//! Static lexicon tables shared by the analyzer, the conflict judge and the
//! retrieval engine. Loaded once, never mutated.

use crate::types::EmotionType;

// ---------------------------------------------------------------------------
// Entity weights by part-of-speech tag
// ---------------------------------------------------------------------------

/// Weight of a token carrying `tag`, or `None` if the tag is not entity-like.
///
/// Person names outrank places and organisations, which outrank other proper
/// nouns, which outrank common nouns.
#[must_use]
pub fn entity_weight(tag: &str) -> Option<f32> {
    match tag {
        "nr" => Some(1.5),
        "ns" | "nt" => Some(1.3),
        "nz" => Some(1.2),
        "n" => Some(1.0),
        "eng" => Some(0.8),
        "vn" => Some(0.6),
        _ => None,
    }
}

/// Tokens that are never entities even when tagged as nouns.
pub const ENTITY_STOPWORDS: &[&str] = &[
    "用户", "AI", "ai", "东西", "时候", "事情", "问题", "样子", "感觉",
];

/// Speaker marker preceding the user's words in a stored utterance.
pub const USER_MARKER: &str = "用户:";
/// Speaker marker preceding the assistant's reply in a stored utterance.
pub const ASSISTANT_MARKER: &str = "AI:";

// ---------------------------------------------------------------------------
// Built-in tagged dictionary
// ---------------------------------------------------------------------------

/// Built-in `(word, tag)` entries used by the lexicon segmenter.
pub const BUILTIN_WORDS: &[(&str, &str)] = &[
    // pronouns
    ("我", "r"), ("你", "r"), ("他", "r"), ("她", "r"), ("它", "r"),
    ("我们", "r"), ("你们", "r"), ("他们", "r"), ("她们", "r"), ("自己", "r"),
    ("这", "r"), ("那", "r"), ("哪", "r"), ("谁", "r"), ("啥", "r"),
    ("这个", "r"), ("那个", "r"), ("这些", "r"), ("那些", "r"), ("哪里", "r"),
    ("什么", "r"), ("怎么", "r"), ("为什么", "r"), ("怎么样", "r"), ("多少", "r"),
    // particles and function words
    ("的", "uj"), ("地", "uv"), ("得", "ud"), ("了", "ul"), ("着", "uz"), ("过", "ug"),
    ("吗", "y"), ("呢", "y"), ("吧", "y"), ("啊", "y"), ("呀", "y"), ("啦", "y"),
    ("哦", "e"), ("嗯", "e"), ("哈哈", "e"),
    ("和", "c"), ("跟", "p"), ("在", "p"), ("把", "p"), ("被", "p"), ("给", "p"),
    ("对", "p"), ("从", "p"), ("比", "p"),
    ("还是", "c"), ("但是", "c"), ("因为", "c"), ("所以", "c"), ("如果", "c"),
    ("而且", "c"), ("或者", "c"), ("不过", "c"), ("可是", "c"),
    // adverbs
    ("不", "d"), ("没", "d"), ("别", "d"), ("也", "d"), ("都", "d"), ("还", "d"),
    ("很", "d"), ("太", "d"), ("真", "d"), ("最", "d"), ("就", "d"), ("又", "d"),
    ("再", "d"), ("才", "d"), ("更", "d"), ("非常", "d"), ("特别", "d"), ("比较", "d"),
    ("其实", "d"), ("已经", "d"), ("一直", "d"), ("真的", "d"), ("一定", "d"),
    ("不再", "d"), ("可能", "d"), ("经常", "d"), ("有点", "d"), ("千万", "d"),
    ("务必", "d"), ("没有", "v"),
    // time words
    ("现在", "t"), ("今天", "t"), ("明天", "t"), ("昨天", "t"), ("以前", "t"),
    ("以后", "t"), ("最近", "t"), ("刚才", "t"), ("刚刚", "t"), ("之前", "t"),
    ("早上", "t"), ("晚上", "t"), ("周末", "t"), ("曾经", "d"),
    // numerals and measures
    ("一", "m"), ("两", "m"), ("三", "m"), ("一个", "m"), ("一只", "m"),
    ("个", "q"), ("只", "q"), ("些", "q"), ("次", "q"),
    // verbs
    ("是", "v"), ("有", "v"), ("会", "v"), ("能", "v"), ("要", "v"), ("想", "v"),
    ("去", "v"), ("来", "v"), ("说", "v"), ("看", "v"), ("听", "v"), ("吃", "v"),
    ("喝", "v"), ("玩", "v"), ("买", "v"), ("做", "v"), ("养", "v"), ("住", "v"),
    ("叫", "v"), ("爱", "v"), ("恨", "v"), ("到", "v"), ("让", "v"), ("换", "v"),
    ("记得", "v"), ("记住", "v"), ("忘记", "v"), ("知道", "v"), ("觉得", "v"),
    ("认为", "v"), ("喜欢", "v"), ("喜爱", "v"), ("讨厌", "v"), ("厌恶", "v"),
    ("受不了", "v"), ("最爱", "v"), ("偏爱", "v"), ("爱吃", "v"), ("爱看", "v"),
    ("爱听", "v"), ("爱玩", "v"), ("搬到", "v"), ("搬家", "v"), ("改成", "v"),
    ("改为", "v"), ("更正", "v"), ("纠正", "v"), ("记错", "v"), ("担心", "v"),
    ("害怕", "v"), ("谢谢", "v"), ("感谢", "v"), ("希望", "v"), ("需要", "v"),
    ("可以", "v"), ("应该", "v"), ("告诉", "v"), ("提到", "v"), ("回忆", "v"),
    ("工作", "vn"), ("学习", "vn"), ("生活", "vn"), ("运动", "vn"), ("旅行", "vn"),
    ("旅游", "vn"), ("跑步", "vn"), ("游泳", "vn"), ("健身", "vn"), ("滑雪", "vn"),
    ("钓鱼", "vn"), ("画画", "vn"), ("唱歌", "vn"), ("跳舞", "vn"), ("摄影", "vn"),
    // adjectives
    ("好", "a"), ("大", "a"), ("小", "a"), ("多", "a"), ("少", "a"), ("新", "a"),
    ("开心", "a"), ("高兴", "a"), ("快乐", "a"), ("难过", "a"), ("伤心", "a"),
    ("生气", "a"), ("愤怒", "a"), ("幸福", "a"), ("失望", "a"), ("孤独", "a"),
    ("焦虑", "a"), ("累", "a"), ("烦", "a"), ("可爱", "a"), ("重要", "a"),
    ("好吃", "a"), ("好听", "a"), ("好看", "a"), ("好玩", "a"), ("有趣", "a"),
    ("无聊", "a"), ("郁闷", "a"), ("兴奋", "a"), ("满意", "a"),
    // food
    ("苹果", "n"), ("香蕉", "n"), ("西瓜", "n"), ("葡萄", "n"), ("橙子", "n"),
    ("草莓", "n"), ("芒果", "n"), ("榴莲", "n"), ("桃子", "n"), ("菠萝", "n"),
    ("水果", "n"), ("蔬菜", "n"), ("食物", "n"), ("米饭", "n"), ("面条", "n"),
    ("饺子", "n"), ("火锅", "n"), ("烧烤", "n"), ("咖啡", "n"), ("奶茶", "n"),
    ("牛奶", "n"), ("啤酒", "n"), ("巧克力", "n"), ("蛋糕", "n"), ("冰淇淋", "n"),
    ("牛肉", "n"), ("猪肉", "n"), ("鸡肉", "n"), ("海鲜", "n"), ("辣椒", "n"),
    ("香菜", "n"), ("披萨", "n"), ("汉堡", "n"), ("寿司", "n"), ("零食", "n"),
    ("早餐", "n"), ("午饭", "n"), ("晚饭", "n"), ("茶", "n"), ("鱼", "n"),
    ("菜", "n"), ("饭", "n"), ("辣", "a"), ("甜", "a"),
    // music, film, books, games
    ("音乐", "n"), ("歌", "n"), ("歌曲", "n"), ("摇滚", "n"), ("古典音乐", "n"),
    ("流行音乐", "n"), ("爵士乐", "n"), ("说唱", "n"), ("钢琴", "n"), ("吉他", "n"),
    ("演唱会", "n"), ("电影", "n"), ("电视剧", "n"), ("动漫", "n"), ("动画", "n"),
    ("综艺", "n"), ("纪录片", "n"), ("科幻片", "n"), ("恐怖片", "n"), ("小说", "n"),
    ("书", "n"), ("漫画", "n"), ("游戏", "n"), ("原神", "nz"), ("王者荣耀", "nz"),
    ("英雄联盟", "nz"),
    // colours
    ("颜色", "n"), ("红色", "n"), ("蓝色", "n"), ("绿色", "n"), ("黄色", "n"),
    ("黑色", "n"), ("白色", "n"), ("紫色", "n"), ("粉色", "n"), ("橙色", "n"),
    ("灰色", "n"),
    // sports
    ("篮球", "n"), ("足球", "n"), ("排球", "n"), ("网球", "n"), ("羽毛球", "n"),
    ("乒乓球", "n"), ("瑜伽", "n"),
    // animals
    ("动物", "n"), ("猫", "n"), ("狗", "n"), ("小猫", "n"), ("小狗", "n"),
    ("宠物", "n"), ("兔子", "n"), ("鸟", "n"), ("仓鼠", "n"), ("熊猫", "n"),
    // people
    ("妈妈", "n"), ("爸爸", "n"), ("父母", "n"), ("家人", "n"), ("哥哥", "n"),
    ("姐姐", "n"), ("弟弟", "n"), ("妹妹", "n"), ("朋友", "n"), ("女朋友", "n"),
    ("男朋友", "n"), ("老婆", "n"), ("老公", "n"), ("孩子", "n"), ("儿子", "n"),
    ("女儿", "n"), ("同事", "n"), ("老板", "n"), ("老师", "n"), ("同学", "n"),
    ("用户", "n"), ("周杰伦", "nr"), ("林俊杰", "nr"),
    // everyday nouns
    ("名字", "n"), ("生日", "n"), ("家", "n"), ("城市", "n"), ("学校", "n"),
    ("公司", "n"), ("大学", "n"), ("房子", "n"), ("手机", "n"), ("电脑", "n"),
    ("工资", "n"), ("考试", "vn"), ("天气", "n"), ("时间", "n"), ("专业", "n"),
    ("职业", "n"), ("程序员", "n"), ("医生", "n"), ("爱好", "n"), ("习惯", "n"),
    ("梦想", "n"), ("身体", "n"), ("东西", "n"), ("时候", "n"), ("事情", "n"),
    ("问题", "n"),
    // places and organisations
    ("北京", "ns"), ("上海", "ns"), ("广州", "ns"), ("深圳", "ns"), ("杭州", "ns"),
    ("成都", "ns"), ("重庆", "ns"), ("南京", "ns"), ("武汉", "ns"), ("西安", "ns"),
    ("天津", "ns"), ("苏州", "ns"), ("香港", "ns"), ("中国", "ns"), ("日本", "ns"),
    ("美国", "ns"), ("英国", "ns"), ("东京", "ns"),
    ("微软", "nt"), ("谷歌", "nt"), ("腾讯", "nt"), ("阿里巴巴", "nt"), ("华为", "nt"),
    ("清华大学", "nt"), ("北京大学", "nt"),
];

// ---------------------------------------------------------------------------
// Emotion keywords
// ---------------------------------------------------------------------------

/// Characters that cancel an immediately following emotion keyword.
pub const NEGATORS: &[char] = &['不', '没', '别'];

/// Emotion keyword buckets in tie-break order.
pub const EMOTION_KEYWORDS: &[(EmotionType, &[&str])] = &[
    (
        EmotionType::Positive,
        &[
            "开心", "高兴", "快乐", "喜欢", "爱", "幸福", "满意", "兴奋", "期待",
            "感谢", "谢谢", "棒", "好玩", "有趣", "温暖", "哈哈",
        ],
    ),
    (
        EmotionType::Negative,
        &[
            "难过", "伤心", "失望", "讨厌", "痛苦", "孤独", "焦虑", "担心", "害怕",
            "累", "哭", "不喜欢", "不开心", "郁闷", "无聊", "受不了",
        ],
    ),
    (
        EmotionType::Angry,
        &["生气", "愤怒", "气死", "恼火", "火大", "可恶", "烦死", "烦"],
    ),
    (
        EmotionType::Important,
        &[
            "记住", "重要", "一定要", "千万", "别忘", "不要忘", "务必", "牢记",
        ],
    ),
];

// ---------------------------------------------------------------------------
// Intent markers
// ---------------------------------------------------------------------------

/// Markers of an interrogative utterance.
pub const QUESTION_INDICATORS: &[&str] = &[
    "吗", "呢", "吧", "?", "？", "什么", "哪", "怎么", "为什么", "还记得",
];

/// Markers that the speaker is correcting or replacing an earlier statement.
pub const UPDATE_INDICATORS: &[&str] = &[
    "其实", "更正", "改成", "改为", "不是", "现在", "不再", "以后", "已经",
    "搬到", "换了", "记错", "纠正", "变成",
];

/// Phrases that ask the assistant to recall something said earlier.
pub const REVIEW_PATTERNS: &[&str] = &[
    "你还记得", "还记得我", "我之前说过", "我以前说过", "我刚才说", "我刚刚说",
    "我曾经说", "我刚才提到", "我刚刚提到", "我之前提到", "我以前提到", "你记得",
    "记得我", "你能回忆", "你能想起", "你能记得", "你能告诉我我", "我问过", "我说过",
    "我提过", "我提到过", "我讲过", "我讲到过", "你知道我", "你能猜", "你猜我",
    "你能想到",
];

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Phrases expressing a positive preference.
pub const POSITIVE_PREFERENCE: &[&str] = &[
    "喜欢", "爱吃", "爱喝", "爱看", "爱听", "爱玩", "最爱", "偏爱", "喜爱",
];

/// Phrases expressing a negative preference. Checked before the positive ones.
pub const NEGATIVE_PREFERENCE: &[&str] = &[
    "不喜欢", "讨厌", "不爱", "厌恶", "受不了", "不想吃", "不吃", "不喝", "不喜爱",
];

/// `(positive, negative)` phrase pairs that contradict each other.
pub const PREFERENCE_PAIRS: &[(&str, &str)] = &[
    ("喜欢", "不喜欢"),
    ("爱", "不爱"),
    ("喜爱", "不喜爱"),
    ("喜欢", "讨厌"),
    ("爱吃", "不吃"),
    ("爱吃", "不想吃"),
];

/// Preference categories with their indicator words, matched in order.
pub const PREFERENCE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "food",
        &[
            "吃", "喝", "食物", "水果", "菜", "饭", "苹果", "香蕉", "西瓜", "葡萄",
            "草莓", "芒果", "榴莲", "火锅", "咖啡", "奶茶", "茶", "蛋糕", "巧克力",
            "辣", "甜",
        ],
    ),
    ("music", &["听", "音乐", "歌", "摇滚", "古典", "爵士", "说唱", "演唱会"]),
    ("movie", &["电影", "电视剧", "动漫", "动画", "综艺", "纪录片", "片"]),
    ("book", &["书", "小说", "漫画", "阅读"]),
    ("game", &["游戏", "玩", "原神", "王者荣耀", "英雄联盟"]),
    ("color", &["颜色", "色"]),
    (
        "sport",
        &[
            "运动", "篮球", "足球", "排球", "网球", "羽毛球", "乒乓球", "跑步", "游泳",
            "健身", "瑜伽", "滑雪",
        ],
    ),
    ("animal", &["动物", "猫", "狗", "宠物", "兔子", "鸟", "仓鼠", "熊猫"]),
];

/// Canned probes sent to every tier when the user asks what they like.
pub const GENERIC_PREFERENCE_PROBES: &[&str] = &["我喜欢", "我不喜欢"];

/// Category-specific probes used alongside the generic ones.
pub const CATEGORY_PREFERENCE_PROBES: &[(&str, &[&str])] = &[
    ("food", &["我喜欢吃", "我不喜欢吃"]),
    ("music", &["我喜欢听", "我不喜欢听"]),
    ("movie", &["我喜欢看", "我不喜欢看"]),
    ("game", &["我喜欢玩", "我不喜欢玩"]),
];
