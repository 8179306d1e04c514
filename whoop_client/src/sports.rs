use std::collections::HashMap;

/// Sport ids as reported in the `sport_id` field of a workout.
pub const SPORTS: [(i64, &str); 100] = [
    (-1, "Activity"),
    (0, "Running"),
    (1, "Cycling"),
    (10, "Box Fitness"),
    (16, "Baseball"),
    (17, "Basketball"),
    (18, "Rowing"),
    (19, "Fencing"),
    (20, "Field Hockey"),
    (21, "Football"),
    (22, "Golf"),
    (24, "Ice Hockey"),
    (25, "Lacrosse"),
    (27, "Rugby"),
    (28, "Sailing"),
    (29, "Skiing"),
    (30, "Soccer"),
    (31, "Softball"),
    (32, "Squash"),
    (33, "Swimming"),
    (34, "Tennis"),
    (35, "Track & Field"),
    (36, "Volleyball"),
    (37, "Water Polo"),
    (38, "Wrestling"),
    (39, "Boxing"),
    (42, "Dance"),
    (43, "Pilates"),
    (44, "Yoga"),
    (45, "Weightlifting"),
    (46, "Canoeing"),
    (47, "Cross Country Skiing"),
    (48, "Functional Fitness"),
    (49, "Duathlon"),
    (50, "Machine Workout"),
    (51, "Gymnastics"),
    (52, "Hiking/Rucking"),
    (53, "Horseback Riding"),
    (54, "Jogging"),
    (55, "Kayaking"),
    (56, "Martial Arts"),
    (57, "Mountain Biking"),
    (58, "Obstacle Racing"),
    (59, "Powerlifting"),
    (60, "Rock Climbing"),
    (61, "Paddleboarding"),
    (62, "Triathlon"),
    (63, "Walking"),
    (64, "Surfing"),
    (65, "Elliptical"),
    (66, "Stairmaster"),
    (67, "Plyometrics"),
    (68, "Spinning"),
    (69, "Sex"),
    (70, "Meditation"),
    (71, "Other"),
    (72, "Pit Practice"),
    (73, "Diving"),
    (74, "Operations - Tactical"),
    (75, "Operations - Medical"),
    (76, "Operations - Flying"),
    (77, "Operations - Water"),
    (82, "Ultimate"),
    (83, "Climber"),
    (84, "Jumping Rope"),
    (85, "Australian Football"),
    (86, "Skateboarding"),
    (87, "Coaching"),
    (88, "Ice Bath"),
    (89, "Commuting"),
    (90, "Gaming"),
    (91, "Snowboarding"),
    (92, "Motocross"),
    (93, "Caddying"),
    (94, "Obstacle Course Racing"),
    (95, "Motor Racing"),
    (96, "HIIT"),
    (97, "Spin"),
    (98, "Jiu Jitsu"),
    (99, "Manual Labor"),
    (100, "Cricket"),
    (101, "Pickleball"),
    (102, "Inline Skating"),
    (104, "Spikeball"),
    (105, "Wheelchair Pushing"),
    (106, "Paddle Tennis"),
    (107, "Barre"),
    (108, "Stage Performance"),
    (109, "High Stress Work"),
    (110, "Parkour"),
    (111, "Gaelic Football"),
    (112, "Hurling/Camogie"),
    (113, "Circus Arts"),
    (116, "Resonance Frequency Breathing"),
    (121, "Massage Therapy"),
    (125, "Watching Sports"),
    (126, "Assault Bike"),
    (127, "Kickboxing"),
    (128, "Stretching"),
    (131, "Other - Recovery"),
];

/// Display name for a workout sport id, if Whoop has one.
pub fn sport_name(sport_id: i64) -> Option<&'static str> {
    SPORTS
        .binary_search_by_key(&sport_id, |(id, _)| *id)
        .ok()
        .map(|idx| SPORTS[idx].1)
}

pub fn sport_map() -> HashMap<i64, &'static str> {
    HashMap::from(SPORTS)
}
